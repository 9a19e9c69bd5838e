// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Horizon daemon library
//!
//! Configuration, definition loading and startup wiring for `horizond`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod definitions;
mod env;
pub mod lifecycle;
pub mod logging;

pub use config::{Config, RuntimeSettings, Settings};
pub use definitions::{load_functions, LoadedDefinitions, SkippedDefinition};
pub use lifecycle::{pool_exhausted, startup, startup_with, Daemon, LifecycleError, RejectedFunction};
