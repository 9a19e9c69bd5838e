// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler configuration.

use crate::error::HorizonError;
use hz_queue::EventFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many unexpected exits inside `window` retire a slot for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrashLoopPolicy {
    pub threshold: usize,
    #[serde(with = "hz_core::duration::human")]
    pub window: Duration,
}

impl Default for CrashLoopPolicy {
    /// 5 crashes within a minute
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonConfig {
    /// Number of worker slots
    pub pool_size: usize,
    /// Execution limit for events that carry no timeout of their own
    pub default_timeout: Duration,
    /// How long a new worker may take to report ready
    pub spawn_timeout: Duration,
    /// Bound on every spawn/assign/kill call into the worker adapter
    pub call_timeout: Duration,
    pub crash_loop: CrashLoopPolicy,
    /// Restricts which pending events this pool takes
    pub filter: EventFilter,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            default_timeout: Duration::from_secs(30),
            spawn_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(5),
            crash_loop: CrashLoopPolicy::default(),
            filter: EventFilter::any(),
        }
    }
}

impl HorizonConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_spawn_timeout(mut self, timeout: Duration) -> Self {
        self.spawn_timeout = timeout;
        self
    }

    pub fn with_crash_loop(mut self, threshold: usize, window: Duration) -> Self {
        self.crash_loop = CrashLoopPolicy { threshold, window };
        self
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn validate(&self) -> Result<(), HorizonError> {
        let zero = |what: &str| Err(HorizonError::InvalidConfig(format!("{what} must be non-zero")));
        if self.pool_size == 0 {
            return zero("pool_size");
        }
        if self.default_timeout.is_zero() {
            return zero("default_timeout");
        }
        if self.spawn_timeout.is_zero() {
            return zero("spawn_timeout");
        }
        if self.call_timeout.is_zero() {
            return zero("call_timeout");
        }
        if self.crash_loop.threshold == 0 {
            return zero("crash_loop.threshold");
        }
        Ok(())
    }
}
