// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! What every enqueuer is handed: the queue, an id source, the error
//! channel and the payload limit.

use crate::error::EnqueuerError;
use hz_core::{Event, EventId, FunctionDef, FunctionId, IdGen, TriggerConfig, TriggerId, TriggerKind, UuidIdGen};
use hz_queue::EventQueue;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default cap on a serialized payload (6 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 6 * 1024 * 1024;

/// An occurrence that could not be turned into a queued event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueFailure {
    pub function_id: FunctionId,
    pub trigger_id: TriggerId,
    pub kind: TriggerKind,
    pub error: EnqueuerError,
}

/// Where enqueuers report construction failures.
///
/// Reporting never blocks: the channel is unbounded and a dropped receiver
/// just leaves the warning in the log.
#[derive(Debug, Clone)]
pub struct ErrorChannel {
    tx: mpsc::UnboundedSender<EnqueueFailure>,
}

impl ErrorChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EnqueueFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A channel nobody reads; failures are only logged.
    pub fn log_only() -> Self {
        Self::new().0
    }

    pub fn report(&self, failure: EnqueueFailure) {
        tracing::warn!(
            function_id = %failure.function_id,
            trigger_id = %failure.trigger_id,
            kind = %failure.kind,
            error = %failure.error,
            "enqueue failed"
        );
        let _ = self.tx.send(failure);
    }
}

/// Shared dependencies of all enqueuers. Cloning is cheap.
#[derive(Clone)]
pub struct EnqueuerContext {
    queue: EventQueue,
    ids: Arc<dyn Fn() -> String + Send + Sync>,
    errors: ErrorChannel,
    max_payload_bytes: usize,
}

impl EnqueuerContext {
    pub fn new(queue: EventQueue, errors: ErrorChannel) -> Self {
        Self::with_ids(queue, errors, UuidIdGen)
    }

    pub fn with_ids<I: IdGen>(queue: EventQueue, errors: ErrorChannel, ids: I) -> Self {
        Self {
            queue,
            ids: Arc::new(move || ids.next()),
            errors,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Build an event for `function` without queueing it.
    pub fn build_event(
        &self,
        function: &FunctionDef,
        trigger: &TriggerConfig,
        payload: serde_json::Value,
    ) -> Result<Event, EnqueuerError> {
        let size = serde_json::to_vec(&payload)
            .map_err(|e| EnqueuerError::Malformed(e.to_string()))?
            .len();
        if size > self.max_payload_bytes {
            return Err(EnqueuerError::PayloadTooLarge {
                size,
                max: self.max_payload_bytes,
            });
        }
        let id = EventId::new((self.ids)());
        Ok(Event::for_function(
            id,
            function,
            trigger.kind,
            Some(trigger.id.clone()),
            payload,
        ))
    }

    /// Build and enqueue; the caller decides how to report failure.
    pub fn submit(
        &self,
        function: &FunctionDef,
        trigger: &TriggerConfig,
        payload: serde_json::Value,
    ) -> Result<EventId, EnqueuerError> {
        let event = self.build_event(function, trigger, payload)?;
        let id = event.id.clone();
        self.queue.enqueue(event)?;
        Ok(id)
    }

    /// Build and enqueue, reporting failures on the error channel.
    pub fn emit(
        &self,
        function: &FunctionDef,
        trigger: &TriggerConfig,
        payload: serde_json::Value,
    ) -> Option<EventId> {
        match self.submit(function, trigger, payload) {
            Ok(id) => Some(id),
            Err(error) => {
                self.report(function, trigger, error);
                None
            }
        }
    }

    pub fn report(&self, function: &FunctionDef, trigger: &TriggerConfig, error: EnqueuerError) {
        self.errors.report(EnqueueFailure {
            function_id: function.id.clone(),
            trigger_id: trigger.id.clone(),
            kind: trigger.kind,
            error,
        });
    }
}

impl std::fmt::Debug for EnqueuerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueuerContext")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
