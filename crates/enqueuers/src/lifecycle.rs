// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start/stop plumbing shared by the source-driven enqueuers.

use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receiver side of a stop signal
pub(crate) type StopSignal = watch::Receiver<bool>;

/// Resolves once stop was requested (or the owner went away).
pub(crate) async fn stopped(signal: &mut StopSignal) {
    let _ = signal.wait_for(|stop| *stop).await;
}

/// Sleep unless stopped first; true if stopped.
pub(crate) async fn sleep_or_stop(delay: Duration, signal: &mut StopSignal) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stopped(signal) => true,
    }
}

struct Running {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One background task that can be started and stopped repeatedly.
#[derive(Default)]
pub(crate) struct TaskSlot {
    running: Mutex<Option<Running>>,
}

impl TaskSlot {
    /// Spawn `run` unless already running. Returns false if it was.
    pub(crate) fn start<F, Fut>(&self, run: F) -> bool
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(stop_rx));
        *running = Some(Running { stop_tx, task });
        true
    }

    /// Signal the task and wait for it to wind down. Safe to repeat.
    pub(crate) async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.task.await {
            if e.is_panic() {
                tracing::error!("enqueuer task panicked");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

/// Exponential reconnect delay with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    /// 100ms doubling up to 30s
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Next delay: uniformly within [base/2, base], where base doubles per
    /// call up to the max.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let low = base / 2;
        let spread = (base - low).as_millis() as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        low + Duration::from_millis(jitter)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
