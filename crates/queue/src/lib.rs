// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! In-process event broker.
//!
//! The [`EventQueue`] is the single source of truth for what must run next.
//! Enqueuers produce into it, the scheduler pops from it, and worker reports
//! ack/nack through it. Every state change of one event happens under a
//! single lock acquisition, so concurrent pop/ack/nack/timeout callers never
//! act on the same transition.

mod error;
mod filter;
mod queue;

pub use error::QueueError;
pub use filter::EventFilter;
pub use queue::{EventQueue, NackOutcome, QueueConfig, QueueStats};
