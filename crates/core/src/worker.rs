// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker slot identity and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Pool-slot identifier, stable across respawns of the same slot.
    pub struct WorkerId;
}

impl WorkerId {
    /// Identifier for the slot at `index` in the pool.
    pub fn for_slot(index: usize) -> Self {
        Self(format!("worker-{}", index))
    }

    /// Slot index encoded in a `worker-<n>` id.
    pub fn slot_index(&self) -> Option<usize> {
        self.0.strip_prefix("worker-")?.parse().ok()
    }
}

/// Worker lifecycle.
///
/// Starting → Idle ⇄ Busy, and Busy → Killing → Dead → Starting on timeout
/// or crash. A slot stays Dead for good after crash-loop exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Killing,
    Dead,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Killing => "killing",
            WorkerStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
