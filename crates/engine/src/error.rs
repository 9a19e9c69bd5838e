// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the scheduler

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HorizonError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("horizon is stopped")]
    Stopped,
}
