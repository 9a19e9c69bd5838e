// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding-window crash counting.

use crate::config::CrashLoopPolicy;
use std::collections::VecDeque;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct CrashTracker {
    policy: CrashLoopPolicy,
    recent: VecDeque<Instant>,
}

impl CrashTracker {
    pub(crate) fn new(policy: CrashLoopPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
        }
    }

    /// Record a crash at `now`. True once the threshold is reached.
    pub(crate) fn record(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.recent.push_back(now);
        self.recent.len() >= self.policy.threshold
    }

    /// Crashes inside the window ending at `now`
    pub(crate) fn recent(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.recent.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) >= self.policy.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(threshold: usize, window_secs: u64) -> CrashTracker {
        CrashTracker::new(CrashLoopPolicy {
            threshold,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn threshold_inside_window_is_exhausted() {
        let mut crashes = tracker(3, 60);
        let start = Instant::now();
        assert!(!crashes.record(start));
        assert!(!crashes.record(start + Duration::from_secs(10)));
        assert!(crashes.record(start + Duration::from_secs(20)));
    }

    #[test]
    fn old_crashes_fall_out_of_window() {
        let mut crashes = tracker(2, 60);
        let start = Instant::now();
        assert!(!crashes.record(start));
        assert!(!crashes.record(start + Duration::from_secs(61)));
        assert_eq!(crashes.recent(start + Duration::from_secs(61)), 1);
        assert_eq!(crashes.recent(start + Duration::from_secs(200)), 0);
    }

    #[test]
    fn threshold_of_one_retires_on_first_crash() {
        assert!(tracker(1, 60).record(Instant::now()));
    }
}
