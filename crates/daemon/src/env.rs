// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve state directory:
/// HORIZON_STATE_DIR > XDG_STATE_HOME/horizon > ~/.local/state/horizon
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("HORIZON_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("horizon"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/horizon"))
}

/// Explicit config file location
pub fn config_path() -> Option<PathBuf> {
    std::env::var("HORIZON_CONFIG").ok().map(PathBuf::from)
}

/// Pool size override, unparsed
pub fn pool_size() -> Option<String> {
    std::env::var("HORIZON_POOL_SIZE").ok()
}

/// Default execution timeout override, unparsed ("30s" style)
pub fn default_timeout() -> Option<String> {
    std::env::var("HORIZON_DEFAULT_TIMEOUT").ok()
}
