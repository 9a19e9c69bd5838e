// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock abstraction.
//!
//! Deadlines inside the engine run on `tokio::time` so they can be paused in
//! tests; the clock here stamps records (enqueue time, finish time) with epoch
//! milliseconds.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch
    fn epoch_ms(&self) -> u64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct FakeClockState {
    now: Instant,
    epoch_ms: u64,
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    /// Start at an arbitrary fixed epoch (2026-01-01T00:00:00Z).
    pub fn new() -> Self {
        Self::at_epoch_ms(1_767_225_600_000)
    }

    pub fn at_epoch_ms(epoch_ms: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                now: Instant::now(),
                epoch_ms,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += by;
        state.epoch_ms += by.as_millis() as u64;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn epoch_ms(&self) -> u64 {
        self.state.lock().epoch_ms
    }
}
