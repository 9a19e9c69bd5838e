// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hz_core::{FunctionId, TriggerId, TriggerKind};
use hz_queue::QueueError;
use thiserror::Error;

/// Errors from enqueuer registration and event construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueuerError {
    /// Trigger options do not match the kind's schema. User-facing; the
    /// function is not registered.
    #[error("invalid options for {kind} trigger {trigger_id}: {reason}")]
    InvalidTriggerOptions {
        trigger_id: TriggerId,
        kind: TriggerKind,
        reason: String,
    },
    #[error("{function_id} has {limit} invocations in flight")]
    TooManyInFlight { function_id: FunctionId, limit: usize },
    #[error("no http trigger of {function_id} matches {method} {path}")]
    NoMatchingTrigger {
        function_id: FunctionId,
        method: String,
        path: String,
    },
    #[error("no {0} source is configured")]
    SourceUnavailable(TriggerKind),
    #[error("payload is {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("malformed trigger data: {0}")]
    Malformed(String),
    #[error("function not registered: {0}")]
    UnknownFunction(FunctionId),
    #[error("enqueuer is stopped")]
    Stopped,
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Failure reported by an external source (broker, change stream, ...)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
