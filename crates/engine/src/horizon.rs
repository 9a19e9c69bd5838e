// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Starting and stopping the scheduler.

use crate::config::HorizonConfig;
use crate::dispatch::{Control, Dispatcher};
use crate::error::HorizonError;
use crate::results::{NoOpResultSink, ResultSink};
use crate::status::{FatalAlert, PoolStatus};
use hz_adapters::{OutputCapture, WorkerAdapter};
use hz_core::{Clock, SystemClock};
use hz_queue::EventQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Worker reports buffered between the adapter and the dispatch loop
const MESSAGE_CAPACITY: usize = 1024;

/// Collaborators the scheduler is wired to.
pub struct HorizonDeps<W: WorkerAdapter> {
    pub queue: EventQueue,
    pub adapter: W,
    pub capture: OutputCapture,
    pub results: Arc<dyn ResultSink>,
    /// Stamps `finished_at_ms` on results
    pub epoch_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl<W: WorkerAdapter> HorizonDeps<W> {
    pub fn new(queue: EventQueue, adapter: W, capture: OutputCapture) -> Self {
        Self {
            queue,
            adapter,
            capture,
            results: Arc::new(NoOpResultSink),
            epoch_ms: Arc::new(|| SystemClock.epoch_ms()),
        }
    }

    pub fn with_results(self, results: impl ResultSink) -> Self {
        self.with_shared_results(Arc::new(results))
    }

    pub fn with_shared_results(mut self, results: Arc<dyn ResultSink>) -> Self {
        self.results = results;
        self
    }

    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.epoch_ms = Arc::new(move || clock.epoch_ms());
        self
    }
}

/// The scheduler: a fixed pool of worker slots fed from the event queue.
pub struct Horizon;

impl Horizon {
    /// Validate `config`, spawn the pool and start dispatching.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<W: WorkerAdapter>(
        config: HorizonConfig,
        deps: HorizonDeps<W>,
    ) -> Result<HorizonHandle, HorizonError> {
        config.validate()?;

        let (control_tx, control_rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(PoolStatus::default());
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(
            config,
            deps.queue,
            deps.adapter,
            deps.capture,
            deps.results,
            deps.epoch_ms,
            control_rx,
            status_tx,
            alert_tx,
            MESSAGE_CAPACITY,
        );
        let task = tokio::spawn(dispatcher.run().instrument(tracing::info_span!("horizon")));

        Ok(HorizonHandle {
            control_tx,
            status_rx,
            alerts: Some(alert_rx),
            task,
        })
    }
}

/// Owner's handle on a running scheduler.
///
/// Dropping it stops the pool with no grace period.
pub struct HorizonHandle {
    control_tx: mpsc::Sender<Control>,
    status_rx: watch::Receiver<PoolStatus>,
    alerts: Option<mpsc::UnboundedReceiver<FatalAlert>>,
    task: JoinHandle<()>,
}

impl HorizonHandle {
    /// Latest published pool status
    pub fn status(&self) -> PoolStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PoolStatus> {
        self.status_rx.clone()
    }

    /// Crash-loop alerts. Returns the receiver once; later calls get `None`.
    pub fn alerts(&mut self) -> Option<mpsc::UnboundedReceiver<FatalAlert>> {
        self.alerts.take()
    }

    /// Wait until the published status satisfies `pred`.
    pub async fn wait_for_status(
        &self,
        mut pred: impl FnMut(&PoolStatus) -> bool,
    ) -> Result<PoolStatus, HorizonError> {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|status| pred(status))
            .await
            .map_err(|_| HorizonError::Stopped)?;
        Ok(status.clone())
    }

    /// Stop taking events, let in-flight executions finish for up to
    /// `grace`, then kill whatever is left and return its events to the
    /// queue.
    pub async fn stop(self, grace: Duration) -> PoolStatus {
        let (reply, rx) = oneshot::channel();
        let status = match self.control_tx.send(Control::Stop { grace, reply }).await {
            Ok(()) => rx.await.ok(),
            Err(_) => None,
        };
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "horizon task failed");
        }
        status.unwrap_or_else(|| self.status_rx.borrow().clone())
    }
}
