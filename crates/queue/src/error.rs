// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hz_core::{EventId, EventState};
use thiserror::Error;

/// Errors from queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// An event with this id was already enqueued (retried delivery or a
    /// caller bug); the new event is dropped.
    #[error("duplicate event id: {0}")]
    DuplicateEvent(EventId),
    #[error("event not found: {0}")]
    NotFound(EventId),
    /// The event already reached a terminal state; terminal states are never
    /// left or re-entered.
    #[error("event {id} already {state}")]
    AlreadyTerminal { id: EventId, state: EventState },
    #[error("invalid transition for event {id}: {from} -> {to}")]
    InvalidTransition {
        id: EventId,
        from: EventState,
        to: EventState,
    },
}
