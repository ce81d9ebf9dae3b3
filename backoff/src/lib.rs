// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Exponential backoff timer used by the fib sync and store save paths.

use std::time::{Duration, Instant};

/// Tracks how long a caller should wait before retrying a failed operation.
/// Every consecutive error doubles the wait, up to a maximum; a success
/// resets it to the initial value.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    last_error: Option<Instant>,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            last_error: None,
        }
    }

    /// Forget any error history and reset the wait to the initial value.
    pub fn report_success(&mut self) {
        self.current = self.initial;
        self.last_error = None;
    }

    /// Record a failed attempt. The first error after a success waits the
    /// initial interval; each consecutive error doubles it up to the max.
    pub fn report_error(&mut self) {
        if self.last_error.is_some() {
            self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        } else {
            self.current = self.initial;
        }
        self.last_error = Some(Instant::now());
    }

    /// Time left until the next retry is due. Zero when no error is pending.
    #[must_use]
    pub fn time_remaining(&self) -> Duration {
        match self.last_error {
            Some(at) => (at + self.current).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    #[must_use]
    pub fn can_try_now(&self) -> bool {
        self.time_remaining().is_zero()
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(8), Duration::from_millis(4096));
        assert!(b.can_try_now());

        b.report_error();
        assert_eq!(b.current, Duration::from_millis(8));
        for _ in 0..20 {
            b.report_error();
        }
        assert_eq!(b.current, Duration::from_millis(4096));
        assert!(b.time_remaining() <= Duration::from_millis(4096));
    }

    #[test]
    fn test_success_resets() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(8), Duration::from_millis(4096));
        b.report_error();
        b.report_error();
        assert_eq!(b.current, Duration::from_millis(16));

        b.report_success();
        assert!(b.can_try_now());
        b.report_error();
        assert_eq!(b.current, Duration::from_millis(8));
    }
}
