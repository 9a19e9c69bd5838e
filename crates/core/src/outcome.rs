// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution outcomes reported by workers and the scheduler.

use crate::event::{EventId, EventState, EventTarget};
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

/// How an execution ended.
///
/// `TimedOut` is kept distinct from `Failed` so callers can tell "ran and
/// failed" apart from "did not finish in time".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed {
        #[serde(default)]
        output: serde_json::Value,
    },
    Failed {
        error: String,
    },
    TimedOut,
}

impl ExecutionOutcome {
    pub fn completed(output: serde_json::Value) -> Self {
        ExecutionOutcome::Completed { output }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ExecutionOutcome::Failed {
            error: error.into(),
        }
    }

    /// Terminal event state this outcome maps to.
    pub fn state(&self) -> EventState {
        match self {
            ExecutionOutcome::Completed { .. } => EventState::Completed,
            ExecutionOutcome::Failed { .. } => EventState::Failed,
            ExecutionOutcome::TimedOut => EventState::TimedOut,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            ExecutionOutcome::Completed { .. } => OutcomeKind::Completed,
            ExecutionOutcome::Failed { .. } => OutcomeKind::Failed,
            ExecutionOutcome::TimedOut => OutcomeKind::TimedOut,
        }
    }
}

/// Payload-free discriminant of [`ExecutionOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    Failed,
    TimedOut,
}

/// Record forwarded to the activity store when an event reaches a terminal
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub event_id: EventId,
    pub target: EventTarget,
    pub outcome: ExecutionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub duration_ms: u64,
    pub finished_at_ms: u64,
}
