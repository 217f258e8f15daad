// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::FLUSH_DELTA_IN_SECONDS;

/// Tracks the flush window.
///
/// Low resolution windows end one delta early so old metrics leave before the next window
/// starts; high resolution windows end one delta late so the last second is complete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushScheduler {
    flush_interval: f64,
    high_resolution: bool,
    last_flush_time: f64,
}

impl FlushScheduler {
    #[must_use]
    pub fn new(flush_interval_in_seconds: u64, high_resolution: bool, now: f64) -> Self {
        Self {
            flush_interval: flush_interval_in_seconds as f64,
            high_resolution,
            last_flush_time: now,
        }
    }

    #[must_use]
    pub fn is_flush_time(&self, now: f64) -> bool {
        let elapsed = now - self.last_flush_time;
        if self.high_resolution {
            elapsed >= self.flush_interval + FLUSH_DELTA_IN_SECONDS
        } else {
            elapsed + FLUSH_DELTA_IN_SECONDS >= self.flush_interval
        }
    }

    pub fn mark_flushed(&mut self, now: f64) {
        self.last_flush_time = now;
    }

    #[must_use]
    pub fn last_flush_time(&self) -> f64 {
        self.last_flush_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_resolution_flushes_one_delta_early() {
        let scheduler = FlushScheduler::new(10, false, 1000.0);
        assert!(!scheduler.is_flush_time(1000.0));
        assert!(!scheduler.is_flush_time(1008.0));
        assert!(scheduler.is_flush_time(1009.0));
    }

    #[test]
    fn test_high_resolution_flushes_one_delta_late() {
        let scheduler = FlushScheduler::new(10, true, 1000.0);
        assert!(!scheduler.is_flush_time(1009.0));
        assert!(!scheduler.is_flush_time(1010.5));
        assert!(scheduler.is_flush_time(1011.0));
    }

    #[test]
    fn test_mark_flushed_restarts_window() {
        let mut scheduler = FlushScheduler::new(60, false, 0.0);
        assert!(scheduler.is_flush_time(59.0));
        scheduler.mark_flushed(59.0);
        assert_eq!(scheduler.last_flush_time(), 59.0);
        assert!(!scheduler.is_flush_time(60.0));
        assert!(scheduler.is_flush_time(118.0));
    }
}
