// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, wiring, shutdown.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use fs2::FileExt;
use hz_adapters::{
    FileLogCollector, OutputCapture, ProcessWorkerAdapter, ProcessWorkerConfig, TracedWorker,
    WorkerAdapter, WorkerError,
};
use hz_engine::{
    ActivityLog, FatalAlert, Horizon, HorizonDeps, HorizonError, HorizonHandle, PoolStatus,
};
use hz_enqueuers::{EnqueuerContext, ErrorChannel, TriggerRegistry, TriggerSources};
use hz_queue::EventQueue;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::definitions::{self, SkippedDefinition};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to read function definitions in {0}: {1}")]
    Definitions(PathBuf, #[source] std::io::Error),

    #[error("Failed to set up logging: {0}")]
    Logging(String),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Scheduler error: {0}")]
    Horizon(#[from] HorizonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A function whose triggers could not be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFunction {
    pub function_id: String,
    pub reason: String,
}

/// Daemon state during operation.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub queue: EventQueue,
    pub registry: TriggerRegistry,
    pub horizon: HorizonHandle,
    /// Definition files that were skipped at load time
    pub skipped: Vec<SkippedDefinition>,
    pub rejected: Vec<RejectedFunction>,
    pub start_time: Instant,
}

/// Start the daemon with process-backed workers
pub async fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    startup_with(config, bind_workers).await
}

/// Start the daemon on the worker adapter `make_workers` builds once the
/// lock is held.
pub async fn startup_with<W, F>(config: &Config, make_workers: F) -> Result<Daemon, LifecycleError>
where
    W: WorkerAdapter,
    F: FnOnce(&Config) -> Result<W, LifecycleError>,
{
    match startup_inner(config, make_workers).await {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock;
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

fn bind_workers(config: &Config) -> Result<TracedWorker<ProcessWorkerAdapter>, LifecycleError> {
    let runtime = &config.settings.runtime;
    let mut process = ProcessWorkerConfig::new(&runtime.command, &config.socket_path)
        .with_args(runtime.args.iter().cloned());
    for (key, value) in &runtime.env {
        process = process.with_env(key, value);
    }
    Ok(TracedWorker::new(ProcessWorkerAdapter::bind(process)?))
}

/// Take the lock and write our PID into it.
fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    // Open without truncating: the file may hold a running daemon's PID
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner<W, F>(config: &Config, make_workers: F) -> Result<Daemon, LifecycleError>
where
    W: WorkerAdapter,
    F: FnOnce(&Config) -> Result<W, LifecycleError>,
{
    // 1. Lock first to prevent races; binding replaces the worker socket
    let lock_file = acquire_lock(config)?;
    std::fs::create_dir_all(&config.logs_path)?;
    let adapter = make_workers(config)?;

    // 2. The one queue shared by enqueuers and the scheduler
    let queue = EventQueue::new();

    // 3. Scheduler
    let capture = OutputCapture::new(FileLogCollector::new(config.logs_path.clone()));
    let deps = HorizonDeps::new(queue.clone(), adapter, capture)
        .with_results(ActivityLog::new(config.logs_path.clone()));
    let horizon = Horizon::start(config.settings.horizon_config(), deps)?;

    // 4. Triggers
    let ctx = EnqueuerContext::new(queue.clone(), ErrorChannel::log_only())
        .with_max_payload_bytes(config.settings.max_payload_bytes);
    let registry = TriggerRegistry::new(ctx, TriggerSources::new());
    let loaded = definitions::load_functions(&config.functions_dir)?;
    let mut rejected = Vec::new();
    for function in loaded.functions {
        let function_id = function.id.to_string();
        match registry.register_function(function).await {
            Ok(count) => info!(%function_id, triggers = count, "function registered"),
            Err(e) => {
                warn!(%function_id, error = %e, "function rejected");
                rejected.push(RejectedFunction {
                    function_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        pool_size = config.settings.pool_size,
        functions = registry.functions().len(),
        "Daemon started"
    );

    Ok(Daemon {
        config: config.clone(),
        lock_file,
        queue,
        registry,
        horizon,
        skipped: loaded.skipped,
        rejected,
        start_time: Instant::now(),
    })
}

impl Daemon {
    /// Crash-loop alerts from the scheduler; available once.
    pub fn alerts(&mut self) -> Option<mpsc::UnboundedReceiver<FatalAlert>> {
        self.horizon.alerts()
    }

    pub fn status(&self) -> PoolStatus {
        self.horizon.status()
    }

    /// Stop triggers, drain the pool within the configured grace, then
    /// remove the socket and PID file.
    pub async fn shutdown(self) -> PoolStatus {
        info!("Shutting down daemon...");

        // 1. No new events
        self.registry.shutdown().await;

        // 2. Let in-flight executions finish; the rest go back to the queue
        let status = self.horizon.stop(self.config.settings.grace).await;
        let stats = self.queue.stats();
        if stats.pending > 0 {
            warn!(pending = stats.pending, "events left unexecuted at shutdown");
        }

        // 3. Remove socket and PID files; the lock goes with lock_file
        for path in [&self.config.socket_path, &self.config.lock_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            completed = stats.completed,
            failed = stats.failed,
            timed_out = stats.timed_out,
            "Daemon shutdown complete"
        );
        status
    }
}

/// Whether every slot has been retired by the crash-loop policy
pub fn pool_exhausted(status: &PoolStatus) -> bool {
    !status.slots.is_empty() && status.slots.iter().all(|s| s.retired)
}

fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
