// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon log file: startup marker, rotation and the tracing subscriber.

use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::lifecycle::LifecycleError;

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- horizond: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- horizond: starting (pid: ";

/// Logs above this size are moved to `<log>.1` at startup
pub const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Move an oversized log aside, replacing any previous `.1` file.
pub fn rotate_log_if_needed(log_path: &Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() <= MAX_LOG_SIZE {
        return;
    }
    let mut rotated = log_path.as_os_str().to_owned();
    rotated.push(".1");
    if let Err(e) = std::fs::rename(log_path, &rotated) {
        eprintln!("warning: failed to rotate {}: {}", log_path.display(), e);
    }
}

/// Append the startup marker so a reader can find where this run begins.
pub fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Write a startup error synchronously; the non-blocking appender may not
/// flush before the process exits.
pub fn write_startup_error(config: &Config, error: &LifecycleError) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

/// Install the global subscriber writing to `config.log_path`.
///
/// `RUST_LOG` overrides the default `info` filter. Keep the guard alive for
/// the life of the process.
pub fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    let file_name = config.log_path.file_name().ok_or(LifecycleError::NoStateDir)?;
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
