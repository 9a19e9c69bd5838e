// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events: one unit of work per trigger occurrence.

use crate::function::{FunctionDef, FunctionId};
use crate::trigger::{TriggerId, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

crate::define_id! {
    /// Unique identifier of an event, assigned at enqueue time.
    pub struct EventId;
}

/// Lifecycle of an event inside the queue.
///
/// Moves Pending → Assigned → Running → {Completed | Failed | TimedOut}.
/// The only backwards edge is the first nack (Assigned/Running → Pending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl EventState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventState::Completed | EventState::Failed | EventState::TimedOut
        )
    }

    /// Assigned or Running: owned by a worker.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, EventState::Assigned | EventState::Running)
    }

    /// Whether `self → next` is a legal forward transition.
    ///
    /// Requeue on nack is not a forward transition and is checked separately
    /// by the queue.
    pub fn can_advance_to(&self, next: EventState) -> bool {
        use EventState::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, Running)
                | (Assigned, Completed)
                | (Assigned, Failed)
                | (Assigned, TimedOut)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Pending => "pending",
            EventState::Assigned => "assigned",
            EventState::Running => "running",
            EventState::Completed => "completed",
            EventState::Failed => "failed",
            EventState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The function and trigger an event was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTarget {
    pub function_id: FunctionId,
    pub trigger: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<TriggerId>,
}

impl EventTarget {
    pub fn new(function_id: impl Into<FunctionId>, trigger: TriggerKind) -> Self {
        Self {
            function_id: function_id.into(),
            trigger,
            trigger_id: None,
        }
    }

    pub fn with_trigger_id(mut self, trigger_id: impl Into<TriggerId>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function_id, self.trigger)
    }
}

/// One pending or in-flight execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub target: EventTarget,
    /// Trigger-specific data (request snapshot, change document, firing time...)
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Environment injected into the worker for this execution
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Maximum wall-clock duration; the scheduler default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Compiled artifact the runtime should load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<PathBuf>,
    pub state: EventState,
    /// Stamped by the queue on enqueue
    #[serde(default)]
    pub enqueued_at_ms: u64,
    /// Number of nacks received so far
    #[serde(default)]
    pub attempts: u32,
}

impl Event {
    pub fn new(id: impl Into<EventId>, target: EventTarget, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            target,
            payload,
            env: BTreeMap::new(),
            timeout_ms: None,
            entrypoint: None,
            state: EventState::Pending,
            enqueued_at_ms: 0,
            attempts: 0,
        }
    }

    /// Build an event for `function`, inheriting its environment and timeout.
    pub fn for_function(
        id: impl Into<EventId>,
        function: &FunctionDef,
        trigger: TriggerKind,
        trigger_id: Option<TriggerId>,
        payload: serde_json::Value,
    ) -> Self {
        let target = EventTarget {
            function_id: function.id.clone(),
            trigger,
            trigger_id,
        };
        let mut event = Self::new(id, target, payload);
        event.env = function.env.clone();
        event.timeout_ms = function.timeout.map(|d| d.as_millis() as u64);
        event.entrypoint = Some(function.entrypoint.clone());
        event
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn function_id(&self) -> &FunctionId {
        &self.target.function_id
    }

    /// Approximate serialized payload size, used for size limits.
    pub fn payload_len(&self) -> usize {
        serde_json::to_vec(&self.payload)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
