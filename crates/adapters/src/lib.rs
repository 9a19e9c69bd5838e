// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: worker processes, the worker socket protocol
//! and output capture

pub mod output;
pub mod protocol;
pub mod traced;
pub mod worker;

pub use output::{
    FileLogCollector, LogCollector, OutputCapture, OutputError, OutputKey, OutputPair, OutputSink,
    OutputStream, TracingLogCollector,
};
pub use protocol::{ProtocolError, WorkerClient};
pub use traced::TracedWorker;
pub use worker::{
    ProcessWorkerAdapter, ProcessWorkerConfig, WorkerAdapter, WorkerError, WorkerHandle,
    WorkerListener, WorkerMessage, WorkerSpawnConfig,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use output::{CollectedChunk, FakeLogCollector};
#[cfg(any(test, feature = "test-support"))]
pub use worker::{FakeBehavior, FakeWorkerAdapter, WorkerCall};
