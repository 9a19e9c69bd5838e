// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::output::OutputPair;
use crate::worker::{WorkerAdapter, WorkerError, WorkerHandle, WorkerMessage, WorkerSpawnConfig};
use async_trait::async_trait;
use hz_core::Event;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Wrapper that adds tracing to any WorkerAdapter
#[derive(Clone)]
pub struct TracedWorker<W> {
    inner: W,
}

impl<W> TracedWorker<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: WorkerAdapter> WorkerAdapter for TracedWorker<W> {
    async fn spawn(
        &self,
        config: WorkerSpawnConfig,
        tx: mpsc::Sender<WorkerMessage>,
    ) -> Result<WorkerHandle, WorkerError> {
        let span = tracing::info_span!(
            "worker.spawn",
            worker_id = %config.worker_id,
            generation = config.generation
        );
        async {
            let start = std::time::Instant::now();
            let result = self.inner.spawn(config, tx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(handle) => tracing::info!(pid = ?handle.pid, elapsed_ms, "worker started"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "spawn failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn assign(
        &self,
        handle: &WorkerHandle,
        event: Event,
        output: OutputPair,
    ) -> Result<(), WorkerError> {
        let span = tracing::info_span!(
            "worker.assign",
            worker_id = %handle.worker_id,
            generation = handle.generation,
            event_id = %event.id,
            function_id = %event.target.function_id,
        );
        async {
            tracing::debug!(payload_len = event.payload_len(), "assigning");
            let result = self.inner.assign(handle, event, output).await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "assign failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn kill(&self, handle: &WorkerHandle) -> Result<(), WorkerError> {
        let result = self.inner.kill(handle).await;
        tracing::info_span!(
            "worker.kill",
            worker_id = %handle.worker_id,
            generation = handle.generation
        )
        .in_scope(|| match &result {
            Ok(()) => tracing::info!("killed"),
            Err(e) => tracing::warn!(error = %e, "kill failed"),
        });
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
