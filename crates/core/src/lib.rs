// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hz-core: shared data model for the Horizon execution engine

pub mod clock;
pub mod duration;
pub mod event;
pub mod function;
pub mod id;
pub mod outcome;
pub mod time_fmt;
pub mod trigger;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use duration::{parse_duration, DurationError};
pub use event::{Event, EventId, EventState, EventTarget};
pub use function::{FunctionDef, FunctionId};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use outcome::{ExecutionOutcome, ExecutionResult, OutcomeKind};
pub use time_fmt::{format_elapsed_ms, format_epoch_ms, format_utc_now};
pub use trigger::{TriggerConfig, TriggerId, TriggerKind, UnknownTriggerKind};
pub use worker::{WorkerId, WorkerStatus};
