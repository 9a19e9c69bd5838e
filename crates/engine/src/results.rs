// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where terminal execution results go.

use crate::log_paths;
use hz_core::{format_elapsed_ms, format_epoch_ms, format_utc_now, ExecutionOutcome, ExecutionResult};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives every terminal outcome the scheduler observes.
///
/// Called from the dispatch loop; implementations must not block.
pub trait ResultSink: Send + Sync + 'static {
    fn record(&self, result: &ExecutionResult);
}

/// Discards results
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResultSink;

impl ResultSink for NoOpResultSink {
    fn record(&self, _result: &ExecutionResult) {}
}

/// Keeps results in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultSink {
    results: Arc<Mutex<Vec<ExecutionResult>>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for MemoryResultSink {
    fn record(&self, result: &ExecutionResult) {
        self.results.lock().push(result.clone());
    }
}

/// Append-only per-function activity log.
///
/// Writes human-readable timestamped lines to
/// `<log_dir>/function/<function_id>.log`. Each record opens, writes and
/// closes the file, which is fine at execution rates.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    log_dir: PathBuf,
}

impl ActivityLog {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Format: `2026-01-30T08:14:09.250Z [completed] evt-1 (http) on worker-0 in 1.2s`
    ///
    /// Stamped with the finish time; results without one get the write time.
    fn line(result: &ExecutionResult) -> String {
        let stamp = match result.finished_at_ms {
            0 => format_utc_now(),
            ms => format_epoch_ms(ms),
        };
        let mut line = format!(
            "{} [{}] {} ({}) ",
            stamp,
            label(&result.outcome),
            result.event_id,
            result.target.trigger,
        );
        if let Some(worker_id) = &result.worker_id {
            line.push_str(&format!("on {} ", worker_id));
        }
        line.push_str(&format!("in {}", format_elapsed_ms(result.duration_ms)));
        if let ExecutionOutcome::Failed { error } = &result.outcome {
            line.push_str(&format!(": {}", error));
        }
        line
    }

    fn append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}

fn label(outcome: &ExecutionOutcome) -> &'static str {
    match outcome {
        ExecutionOutcome::Completed { .. } => "completed",
        ExecutionOutcome::Failed { .. } => "failed",
        ExecutionOutcome::TimedOut => "timed_out",
    }
}

impl ResultSink for ActivityLog {
    fn record(&self, result: &ExecutionResult) {
        let function_id = result.target.function_id.as_str();
        let path = log_paths::function_log_path(&self.log_dir, function_id);
        if let Err(e) = self.append(&path, &Self::line(result)) {
            tracing::warn!(function_id, error = %e, "failed to write activity log");
        }
    }
}

/// Forward each result to several sinks.
pub struct FanOutResultSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanOutResultSink {
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { sinks }
    }
}

impl ResultSink for FanOutResultSink {
    fn record(&self, result: &ExecutionResult) {
        for sink in &self.sinks {
            sink.record(result);
        }
    }
}

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;
