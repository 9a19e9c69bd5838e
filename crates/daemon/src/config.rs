// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: paths under the state directory plus the
//! `horizond.toml` settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hz_core::parse_duration;
use hz_engine::{CrashLoopPolicy, HorizonConfig};
use hz_enqueuers::DEFAULT_MAX_PAYLOAD_BYTES;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::env;
use crate::lifecycle::LifecycleError;

/// Config file looked up in the state directory when none is given
pub const CONFIG_FILE_NAME: &str = "horizond.toml";

/// How worker processes are started
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Runtime executable that connects back over the worker socket
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            command: PathBuf::from("horizon-runtime"),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Contents of `horizond.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub pool_size: usize,
    #[serde(with = "hz_core::duration::human")]
    pub default_timeout: Duration,
    #[serde(with = "hz_core::duration::human")]
    pub spawn_timeout: Duration,
    #[serde(with = "hz_core::duration::human")]
    pub call_timeout: Duration,
    /// How long shutdown waits for in-flight executions
    #[serde(with = "hz_core::duration::human")]
    pub grace: Duration,
    pub crash_loop: CrashLoopPolicy,
    pub runtime: RuntimeSettings,
    /// Function definitions; defaults to `<state>/functions`
    pub functions_dir: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let horizon = HorizonConfig::default();
        Self {
            pool_size: horizon.pool_size,
            default_timeout: horizon.default_timeout,
            spawn_timeout: horizon.spawn_timeout,
            call_timeout: horizon.call_timeout,
            grace: Duration::from_secs(10),
            crash_loop: horizon.crash_loop,
            runtime: RuntimeSettings::default(),
            functions_dir: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self, LifecycleError> {
        toml::from_str(text).map_err(|e| LifecycleError::Config(e.to_string()))
    }

    pub fn read(path: &Path) -> Result<Self, LifecycleError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text).map_err(|e| match e {
            LifecycleError::Config(msg) => {
                LifecycleError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Apply `HORIZON_POOL_SIZE` / `HORIZON_DEFAULT_TIMEOUT`.
    pub fn apply_env(&mut self) -> Result<(), LifecycleError> {
        if let Some(raw) = env::pool_size() {
            self.pool_size = raw
                .trim()
                .parse()
                .map_err(|_| LifecycleError::Config(format!("HORIZON_POOL_SIZE: invalid number {raw:?}")))?;
        }
        if let Some(raw) = env::default_timeout() {
            self.default_timeout = parse_duration(&raw)
                .map_err(|e| LifecycleError::Config(format!("HORIZON_DEFAULT_TIMEOUT: {e}")))?;
        }
        Ok(())
    }

    pub fn horizon_config(&self) -> HorizonConfig {
        HorizonConfig {
            pool_size: self.pool_size,
            default_timeout: self.default_timeout,
            spawn_timeout: self.spawn_timeout,
            call_timeout: self.call_timeout,
            crash_loop: self.crash_loop,
            ..HorizonConfig::default()
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/horizon)
    pub state_dir: PathBuf,
    /// Unix socket worker processes connect to
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Captured output and per-function activity logs
    pub logs_path: PathBuf,
    pub functions_dir: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// Load configuration.
    ///
    /// The file is `explicit`, else `$HORIZON_CONFIG`, else
    /// `<state>/horizond.toml` when present; defaults otherwise. Environment
    /// overrides apply last.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        let path = explicit.or_else(env::config_path).or_else(|| {
            let default = state_dir.join(CONFIG_FILE_NAME);
            default.exists().then_some(default)
        });

        let mut settings = match path {
            Some(path) => Settings::read(&path)?,
            None => Settings::default(),
        };
        settings.apply_env()?;
        let config = Self::new(state_dir, settings);
        config.validate()?;
        Ok(config)
    }

    pub fn new(state_dir: PathBuf, settings: Settings) -> Self {
        let functions_dir = settings
            .functions_dir
            .clone()
            .unwrap_or_else(|| state_dir.join("functions"));
        Self {
            socket_path: state_dir.join("workers.sock"),
            lock_path: state_dir.join("horizond.pid"),
            log_path: state_dir.join("horizond.log"),
            logs_path: state_dir.join("logs"),
            functions_dir,
            settings,
            state_dir,
        }
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        self.settings
            .horizon_config()
            .validate()
            .map_err(|e| LifecycleError::Config(e.to_string()))?;
        if self.settings.max_payload_bytes == 0 {
            return Err(LifecycleError::Config(
                "max_payload_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
