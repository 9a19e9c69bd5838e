// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event queue broker.

use crate::error::QueueError;
use crate::filter::EventFilter;
use hz_core::{Clock, Event, EventId, EventState, ExecutionOutcome, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Default number of terminal event ids remembered for duplicate detection
/// and late-ack reporting.
pub const DEFAULT_RETAINED_TERMINAL: usize = 10_000;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How many terminal event ids to remember after they leave the active set
    pub retained_terminal: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retained_terminal: DEFAULT_RETAINED_TERMINAL,
        }
    }
}

/// Point-in-time counts.
///
/// `pending`/`assigned`/`running` describe the active set; the remaining
/// fields are running totals since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub requeued: u64,
}

/// Result of a nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// First nack: the event is Pending again at its original position
    Requeued,
    /// Second nack: the event is Failed so it cannot loop forever
    Failed,
}

struct Entry {
    event: Event,
    /// Enqueue sequence number; FIFO key, preserved across a requeue
    seq: u64,
    state_tx: watch::Sender<EventState>,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    pending: BTreeMap<u64, EventId>,
    active: HashMap<EventId, Entry>,
    terminal: HashMap<EventId, EventState>,
    terminal_order: VecDeque<EventId>,
    completed: u64,
    failed: u64,
    timed_out: u64,
    requeued: u64,
}

impl QueueState {
    fn missing(&self, id: &EventId) -> QueueError {
        match self.terminal.get(id) {
            Some(state) => QueueError::AlreadyTerminal {
                id: id.clone(),
                state: *state,
            },
            None => QueueError::NotFound(id.clone()),
        }
    }

    /// Move an in-flight event out of the active set into a terminal state.
    fn retire(&mut self, id: &EventId, next: EventState, retained: usize) -> Option<Event> {
        let mut entry = self.active.remove(id)?;
        entry.event.state = next;
        entry.state_tx.send_replace(next);

        match next {
            EventState::Completed => self.completed += 1,
            EventState::Failed => self.failed += 1,
            EventState::TimedOut => self.timed_out += 1,
            _ => {}
        }

        self.terminal.insert(id.clone(), next);
        self.terminal_order.push_back(id.clone());
        while self.terminal_order.len() > retained {
            if let Some(evicted) = self.terminal_order.pop_front() {
                self.terminal.remove(&evicted);
            }
        }

        Some(entry.event)
    }
}

struct Inner {
    state: Mutex<QueueState>,
    available: Notify,
    config: QueueConfig,
    epoch_ms: Box<dyn Fn() -> u64 + Send + Sync>,
}

/// Shared handle to the broker. Cloning is cheap; all clones see the same
/// queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_clock(QueueConfig::default(), SystemClock)
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    pub fn with_clock<C: Clock>(config: QueueConfig, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
                config,
                epoch_ms: Box::new(move || clock.epoch_ms()),
            }),
        }
    }

    /// Add a new event in the Pending state.
    ///
    /// The queue stamps `enqueued_at_ms` and resets state and attempts.
    /// Fails with [`QueueError::DuplicateEvent`] if the id is live or was
    /// recently retired.
    pub fn enqueue(&self, mut event: Event) -> Result<(), QueueError> {
        {
            let mut state = self.inner.state.lock();
            if state.active.contains_key(&event.id) || state.terminal.contains_key(&event.id) {
                tracing::warn!(event_id = %event.id, "duplicate event dropped");
                return Err(QueueError::DuplicateEvent(event.id));
            }

            event.state = EventState::Pending;
            event.attempts = 0;
            event.enqueued_at_ms = (self.inner.epoch_ms)();

            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.insert(seq, event.id.clone());

            tracing::debug!(
                event_id = %event.id,
                target = %event.target,
                seq,
                "enqueued"
            );
            let (state_tx, _) = watch::channel(EventState::Pending);
            state.active.insert(
                event.id.clone(),
                Entry {
                    event,
                    seq,
                    state_tx,
                },
            );
        }
        self.inner.available.notify_waiters();
        Ok(())
    }

    /// Take the oldest Pending event matching `filter`, marking it Assigned.
    pub fn try_pop(&self, filter: &EventFilter) -> Option<Event> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let (seq, id) = state
            .pending
            .iter()
            .find(|(_, id)| {
                state
                    .active
                    .get(*id)
                    .is_some_and(|entry| filter.matches(&entry.event))
            })
            .map(|(seq, id)| (*seq, id.clone()))?;

        state.pending.remove(&seq);
        let entry = state.active.get_mut(&id)?;
        entry.event.state = EventState::Assigned;
        entry.state_tx.send_replace(EventState::Assigned);
        Some(entry.event.clone())
    }

    /// Wait for the oldest Pending event matching `filter` and mark it
    /// Assigned.
    ///
    /// Cancel-safe: the transition happens in the same synchronous step that
    /// produces the return value, so dropping the future never loses an event.
    pub async fn pop(&self, filter: &EventFilter) -> Event {
        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent enqueue
            // between the check and the await still wakes us.
            notified.as_mut().enable();

            if let Some(event) = self.try_pop(filter) {
                return event;
            }
            notified.await;
        }
    }

    /// Assigned → Running: the worker has claimed the event.
    pub fn mark_running(&self, id: &EventId) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.active.get_mut(id) else {
            return Err(state.missing(id));
        };
        let from = entry.event.state;
        if !from.can_advance_to(EventState::Running) {
            return Err(QueueError::InvalidTransition {
                id: id.clone(),
                from,
                to: EventState::Running,
            });
        }
        entry.event.state = EventState::Running;
        entry.state_tx.send_replace(EventState::Running);
        Ok(())
    }

    /// Move an in-flight event to the terminal state matching `outcome`.
    ///
    /// The first terminal writer wins: acking an event that already timed out
    /// or failed returns [`QueueError::AlreadyTerminal`] and changes nothing.
    pub fn ack(&self, id: &EventId, outcome: &ExecutionOutcome) -> Result<Event, QueueError> {
        self.finish(id, outcome.state())
    }

    /// Assigned/Running → TimedOut.
    pub fn time_out(&self, id: &EventId) -> Result<Event, QueueError> {
        self.finish(id, EventState::TimedOut)
    }

    /// Reject an in-flight event.
    ///
    /// The first nack returns it to Pending at its original FIFO position;
    /// a second nack fails it.
    pub fn nack(&self, id: &EventId, reason: &str) -> Result<NackOutcome, QueueError> {
        let outcome = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.active.get_mut(id) else {
                return Err(state.missing(id));
            };
            let from = entry.event.state;
            if !from.is_in_flight() {
                return Err(QueueError::InvalidTransition {
                    id: id.clone(),
                    from,
                    to: EventState::Pending,
                });
            }

            if entry.event.attempts == 0 {
                entry.event.attempts = 1;
                entry.event.state = EventState::Pending;
                entry.state_tx.send_replace(EventState::Pending);
                let seq = entry.seq;
                state.pending.insert(seq, id.clone());
                state.requeued += 1;
                NackOutcome::Requeued
            } else {
                state.retire(id, EventState::Failed, self.inner.config.retained_terminal);
                NackOutcome::Failed
            }
        };

        match outcome {
            NackOutcome::Requeued => {
                tracing::info!(event_id = %id, reason, "nacked, requeued");
                self.inner.available.notify_waiters();
            }
            NackOutcome::Failed => {
                tracing::warn!(event_id = %id, reason, "nacked twice, failed");
            }
        }
        Ok(outcome)
    }

    fn finish(&self, id: &EventId, next: EventState) -> Result<Event, QueueError> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(entry) = state.active.get(id) else {
            return Err(state.missing(id));
        };
        let from = entry.event.state;
        if !from.can_advance_to(next) {
            return Err(QueueError::InvalidTransition {
                id: id.clone(),
                from,
                to: next,
            });
        }
        state
            .retire(id, next, self.inner.config.retained_terminal)
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    /// Observe an event's state.
    ///
    /// For a retired event the receiver holds its terminal state. Returns
    /// `None` for unknown ids.
    pub fn watch(&self, id: &EventId) -> Option<watch::Receiver<EventState>> {
        let state = self.inner.state.lock();
        if let Some(entry) = state.active.get(id) {
            return Some(entry.state_tx.subscribe());
        }
        state.terminal.get(id).map(|s| watch::channel(*s).1)
    }

    /// Snapshot of a live event.
    pub fn get(&self, id: &EventId) -> Option<Event> {
        self.inner
            .state
            .lock()
            .active
            .get(id)
            .map(|e| e.event.clone())
    }

    /// Current state of a live or recently retired event.
    pub fn state_of(&self, id: &EventId) -> Option<EventState> {
        let state = self.inner.state.lock();
        state
            .active
            .get(id)
            .map(|e| e.event.state)
            .or_else(|| state.terminal.get(id).copied())
    }

    pub fn len_pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let mut stats = QueueStats {
            pending: state.pending.len(),
            completed: state.completed,
            failed: state.failed,
            timed_out: state.timed_out,
            requeued: state.requeued,
            ..QueueStats::default()
        };
        for entry in state.active.values() {
            match entry.event.state {
                EventState::Assigned => stats.assigned += 1,
                EventState::Running => stats.running += 1,
                _ => {}
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
