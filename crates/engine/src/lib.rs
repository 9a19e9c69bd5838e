// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Horizon: the worker pool that executes queued events

mod config;
mod crash;
mod dispatch;
mod error;
mod horizon;
pub mod log_paths;
mod results;
mod slot;
mod status;

pub use config::{CrashLoopPolicy, HorizonConfig};
pub use error::HorizonError;
pub use horizon::{Horizon, HorizonDeps, HorizonHandle};
pub use results::{ActivityLog, FanOutResultSink, MemoryResultSink, NoOpResultSink, ResultSink};
pub use status::{FatalAlert, PoolStatus, SlotSummary};
