// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool health published to the operational-status collaborator.

use hz_core::{EventId, WorkerId, WorkerStatus};
use serde::Serialize;
use std::time::Duration;

/// One slot as seen from outside the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Unexpected exits still inside the crash-loop window
    pub recent_crashes: usize,
    /// Dead for good after crash-loop exhaustion
    pub retired: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub idle: usize,
    pub busy: usize,
    pub starting: usize,
    pub killing: usize,
    pub dead: usize,
    /// Unexpected exits since start
    pub crashes: u64,
    /// The dispatch loop has exited
    pub stopped: bool,
    pub slots: Vec<SlotSummary>,
}

impl PoolStatus {
    pub fn from_slots(slots: Vec<SlotSummary>, crashes: u64, stopped: bool) -> Self {
        let mut status = PoolStatus {
            crashes,
            stopped,
            ..PoolStatus::default()
        };
        for slot in &slots {
            match slot.status {
                WorkerStatus::Idle => status.idle += 1,
                WorkerStatus::Busy => status.busy += 1,
                WorkerStatus::Starting => status.starting += 1,
                WorkerStatus::Killing => status.killing += 1,
                WorkerStatus::Dead => status.dead += 1,
            }
        }
        status.slots = slots;
        status
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&SlotSummary> {
        self.slots.get(index)
    }

    /// Every slot can take work
    pub fn all_idle(&self) -> bool {
        !self.slots.is_empty() && self.idle == self.slots.len()
    }
}

/// Raised when a slot is retired after a crash loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalAlert {
    pub worker_id: WorkerId,
    pub crashes: usize,
    pub window: Duration,
    /// What the last crash was
    pub reason: String,
}

impl std::fmt::Display for FatalAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} crashed {} times within {:?} (last: {}); slot retired",
            self.worker_id, self.crashes, self.window, self.reason
        )
    }
}
