// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process management
//!
//! A [`WorkerAdapter`] owns the OS processes behind the scheduler's pool
//! slots. The scheduler only ever refers to a process through a
//! [`WorkerHandle`]; everything the process does comes back as a
//! [`WorkerMessage`] on the channel passed to `spawn`.
//!
//! # Generations
//!
//! ```text
//! worker-0  (slot, stable)
//!    ├── generation 1  (first process)
//!    └── generation 2  (respawn after timeout or crash)
//! ```
//!
//! Every message is tagged with the generation that produced it, so a late
//! report from a killed process can never be mistaken for one from its
//! replacement.

mod listener;
mod process;

pub use listener::WorkerListener;
pub use process::{ProcessWorkerAdapter, ProcessWorkerConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBehavior, FakeWorkerAdapter, WorkerCall};

use crate::output::OutputPair;
use crate::protocol::ProtocolError;
use async_trait::async_trait;
use hz_core::{Event, EventId, WorkerId};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from worker operations
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Assignment to a worker that already runs an event. Reaching this is a
    /// scheduler bug.
    #[error("worker {0} is busy")]
    Busy(WorkerId),
    #[error("worker not found: {0}")]
    NotFound(WorkerId),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to start for one slot generation
#[derive(Debug, Clone)]
pub struct WorkerSpawnConfig {
    pub worker_id: WorkerId,
    pub generation: u64,
    /// Extra environment on top of the adapter's own
    pub env: BTreeMap<String, String>,
}

impl WorkerSpawnConfig {
    pub fn new(worker_id: WorkerId, generation: u64) -> Self {
        Self {
            worker_id,
            generation,
            env: BTreeMap::new(),
        }
    }
}

/// Reference to one live process generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub worker_id: WorkerId,
    pub generation: u64,
    pub pid: Option<u32>,
}

/// Reports from a worker process to the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Handshake done; the worker can accept an assignment
    Ready { worker_id: WorkerId, generation: u64 },
    /// The worker popped its assigned event and started executing
    Claimed {
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
    },
    Completed {
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
        output: serde_json::Value,
    },
    Failed {
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
        error: String,
    },
    Nacked {
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
        reason: String,
    },
    /// The process exited without being killed
    Exited {
        worker_id: WorkerId,
        generation: u64,
        exit_code: Option<i32>,
    },
}

impl WorkerMessage {
    pub fn worker_id(&self) -> &WorkerId {
        match self {
            WorkerMessage::Ready { worker_id, .. }
            | WorkerMessage::Claimed { worker_id, .. }
            | WorkerMessage::Completed { worker_id, .. }
            | WorkerMessage::Failed { worker_id, .. }
            | WorkerMessage::Nacked { worker_id, .. }
            | WorkerMessage::Exited { worker_id, .. } => worker_id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            WorkerMessage::Ready { generation, .. }
            | WorkerMessage::Claimed { generation, .. }
            | WorkerMessage::Completed { generation, .. }
            | WorkerMessage::Failed { generation, .. }
            | WorkerMessage::Nacked { generation, .. }
            | WorkerMessage::Exited { generation, .. } => *generation,
        }
    }

    pub fn event_id(&self) -> Option<&EventId> {
        match self {
            WorkerMessage::Claimed { event_id, .. }
            | WorkerMessage::Completed { event_id, .. }
            | WorkerMessage::Failed { event_id, .. }
            | WorkerMessage::Nacked { event_id, .. } => Some(event_id),
            WorkerMessage::Ready { .. } | WorkerMessage::Exited { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkerMessage::Ready { .. } => "ready",
            WorkerMessage::Claimed { .. } => "claimed",
            WorkerMessage::Completed { .. } => "completed",
            WorkerMessage::Failed { .. } => "failed",
            WorkerMessage::Nacked { .. } => "nacked",
            WorkerMessage::Exited { .. } => "exited",
        }
    }
}

/// Adapter for worker processes
#[async_trait]
pub trait WorkerAdapter: Clone + Send + Sync + 'static {
    /// Start a process for one slot generation.
    ///
    /// The adapter sends `Ready` on `tx` once the process can take work and
    /// `Exited` if it dies on its own.
    async fn spawn(
        &self,
        config: WorkerSpawnConfig,
        tx: mpsc::Sender<WorkerMessage>,
    ) -> Result<WorkerHandle, WorkerError>;

    /// Hand an event to an Idle worker along with the sinks for its output.
    ///
    /// Fails with [`WorkerError::Busy`] if the worker is running something.
    async fn assign(
        &self,
        handle: &WorkerHandle,
        event: Event,
        output: OutputPair,
    ) -> Result<(), WorkerError>;

    /// Force-terminate the process.
    ///
    /// Idempotent. When this returns, the output sinks of the current
    /// execution are closed and no further messages for this generation are
    /// sent.
    async fn kill(&self, handle: &WorkerHandle) -> Result<(), WorkerError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
