// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The slot table: one ownership record per pool position.
//!
//! Only the dispatch loop touches it. A slot's process is reachable solely
//! through its [`WorkerHandle`]; kill and respawn act on the slot.

use crate::config::CrashLoopPolicy;
use crate::crash::CrashTracker;
use crate::status::SlotSummary;
use hz_adapters::WorkerHandle;
use hz_core::{EventId, EventTarget, WorkerId, WorkerStatus};
use tokio::time::Instant;

/// The event a Busy slot is executing
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub event_id: EventId,
    pub target: EventTarget,
    pub started_at: Instant,
    pub deadline: Instant,
    /// The worker popped it (event is Running)
    pub claimed: bool,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    /// Incremented on every spawn
    pub generation: u64,
    pub handle: Option<WorkerHandle>,
    pub assignment: Option<Assignment>,
    /// Ready deadline while Starting
    pub spawn_deadline: Option<Instant>,
    /// When a Dead slot should be respawned; None once retired
    pub respawn_at: Option<Instant>,
    pub retired: bool,
    pub crashes: CrashTracker,
}

impl Slot {
    pub(crate) fn new(index: usize, policy: CrashLoopPolicy) -> Self {
        Self {
            worker_id: WorkerId::for_slot(index),
            status: WorkerStatus::Dead,
            generation: 0,
            handle: None,
            assignment: None,
            spawn_deadline: None,
            respawn_at: None,
            retired: false,
            crashes: CrashTracker::new(policy),
        }
    }

    /// Whether a message from `generation` may act on this slot.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        generation == self.generation
            && !matches!(self.status, WorkerStatus::Killing | WorkerStatus::Dead)
    }

    pub(crate) fn is_assigned(&self, event_id: &EventId) -> bool {
        self.assignment.as_ref().is_some_and(|a| &a.event_id == event_id)
    }

    /// Earliest instant this slot needs attention.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self.status {
            WorkerStatus::Busy => self.assignment.as_ref().map(|a| a.deadline),
            WorkerStatus::Starting => self.spawn_deadline,
            WorkerStatus::Dead => self.respawn_at,
            WorkerStatus::Idle | WorkerStatus::Killing => None,
        }
    }

    pub(crate) fn summary(&mut self, now: Instant) -> SlotSummary {
        SlotSummary {
            worker_id: self.worker_id.clone(),
            status: self.status,
            generation: self.generation,
            event_id: self.assignment.as_ref().map(|a| a.event_id.clone()),
            recent_crashes: self.crashes.recent(now),
            retired: self.retired,
        }
    }
}

/// Fixed-size arena of slots indexed by pool position.
#[derive(Debug)]
pub(crate) struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub(crate) fn new(size: usize, policy: CrashLoopPolicy) -> Self {
        Self {
            slots: (0..size).map(|i| Slot::new(i, policy)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Slot index for a worker id, if it belongs to this table
    pub(crate) fn index_of(&self, worker_id: &WorkerId) -> Option<usize> {
        worker_id.slot_index().filter(|i| *i < self.slots.len())
    }

    /// Lowest-index Idle slot
    pub(crate) fn first_idle(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.status == WorkerStatus::Idle)
    }

    pub(crate) fn has_idle(&self) -> bool {
        self.first_idle().is_some()
    }

    pub(crate) fn busy(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == WorkerStatus::Busy)
            .count()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().filter_map(Slot::deadline).min()
    }

    /// Indices of slots whose deadline is at or before `now`
    pub(crate) fn due(&self, now: Instant) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.deadline().is_some_and(|d| d <= now))
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn summaries(&mut self, now: Instant) -> Vec<SlotSummary> {
        self.slots.iter_mut().map(|s| s.summary(now)).collect()
    }

    pub(crate) fn indices(&self) -> std::ops::Range<usize> {
        0..self.slots.len()
    }
}

// Indices come from `indices`, `index_of`, `first_idle` or `due`, so they
// are always in range.
impl std::ops::Index<usize> for SlotTable {
    type Output = Slot;

    fn index(&self, index: usize) -> &Slot {
        &self.slots[index]
    }
}

impl std::ops::IndexMut<usize> for SlotTable {
    fn index_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
