// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-execution stdout/stderr capture.
//!
//! [`OutputCapture::open`] hands out a pair of [`OutputSink`]s bound to one
//! event. Bytes written to a sink are forwarded, in write order, to the
//! configured [`LogCollector`] under that event's key. A sink is closed
//! exactly once: explicitly, or when it is dropped.

mod file;
mod tracing_collector;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use file::{event_output_path, FileLogCollector};
pub use tracing_collector::TracingLogCollector;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{CollectedChunk, FakeLogCollector};

use hz_core::{EventId, FunctionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies whose output a chunk is
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub event_id: EventId,
    pub function_id: FunctionId,
}

impl OutputKey {
    pub fn new(event_id: impl Into<EventId>, function_id: impl Into<FunctionId>) -> Self {
        Self {
            event_id: event_id.into(),
            function_id: function_id.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("output sink for {event_id} ({stream}) is closed")]
    Closed {
        event_id: EventId,
        stream: OutputStream,
    },
}

/// Destination for captured output.
///
/// Implementations must tolerate interleaved calls for different keys.
/// `close` is called once per (key, stream) after the last `write`.
pub trait LogCollector: Send + Sync + 'static {
    fn write(&self, key: &OutputKey, stream: OutputStream, chunk: &[u8]);
    fn close(&self, key: &OutputKey, stream: OutputStream);
}

/// Factory for per-event sink pairs
#[derive(Clone)]
pub struct OutputCapture {
    collector: Arc<dyn LogCollector>,
}

impl OutputCapture {
    pub fn new(collector: impl LogCollector) -> Self {
        Self {
            collector: Arc::new(collector),
        }
    }

    pub fn from_arc(collector: Arc<dyn LogCollector>) -> Self {
        Self { collector }
    }

    /// Open the stdout/stderr sinks for one execution.
    pub fn open(&self, event_id: &EventId, function_id: &FunctionId) -> OutputPair {
        let key = OutputKey::new(event_id.clone(), function_id.clone());
        OutputPair {
            stdout: OutputSink::new(key.clone(), OutputStream::Stdout, self.collector.clone()),
            stderr: OutputSink::new(key, OutputStream::Stderr, self.collector.clone()),
        }
    }
}

impl std::fmt::Debug for OutputCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCapture").finish_non_exhaustive()
    }
}

/// The two sinks belonging to one execution
#[derive(Debug)]
pub struct OutputPair {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl OutputPair {
    pub fn sink_mut(&mut self, stream: OutputStream) -> &mut OutputSink {
        match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        }
    }

    pub fn close(&mut self) {
        self.stdout.close();
        self.stderr.close();
    }

    pub fn key(&self) -> &OutputKey {
        &self.stdout.key
    }
}

/// Write end for one stream of one execution
pub struct OutputSink {
    key: OutputKey,
    stream: OutputStream,
    collector: Arc<dyn LogCollector>,
    closed: bool,
    bytes_written: u64,
}

impl OutputSink {
    fn new(key: OutputKey, stream: OutputStream, collector: Arc<dyn LogCollector>) -> Self {
        Self {
            key,
            stream,
            collector,
            closed: false,
            bytes_written: 0,
        }
    }

    /// Forward a chunk to the collector. Empty chunks are ignored.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed {
                event_id: self.key.event_id.clone(),
                stream: self.stream,
            });
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.bytes_written += chunk.len() as u64;
        self.collector.write(&self.key, self.stream, chunk);
        Ok(())
    }

    /// Idempotent; only the first call reaches the collector.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.collector.close(&self.key, self.stream);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    pub fn key(&self) -> &OutputKey {
        &self.key
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("key", &self.key)
            .field("stream", &self.stream)
            .field("closed", &self.closed)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

#[cfg(test)]
#[path = "../output_tests.rs"]
mod tests;
