//! Bounded exponential backoff policy for activity execution.
//!
//! `interval_n = min(initial * coefficient^n, max_interval)`, with optional
//! multiplicative jitter. The policy is configuration, not state: each
//! activity invocation builds a fresh [`BackoffSchedule`] from it.

use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration attached to each activity invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after every retry.
    pub backoff_coefficient: f64,
    /// Ceiling for the computed delay.
    pub max_interval: Duration,
    /// Total attempts, the first one included. Exhaustion after this many
    /// surfaces to the workflow.
    pub maximum_attempts: u32,
    /// Per-attempt timeout for the wrapped operation.
    pub start_to_close_timeout: Duration,
    /// Randomize each delay in `[0.8, 1.2] * interval` to avoid retry
    /// stampedes. Disabled in tests that assert exact schedules.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(3),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(15),
            maximum_attempts: 3,
            start_to_close_timeout: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// A fast schedule for tests: millisecond delays, no jitter.
    pub fn immediate() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(4),
            maximum_attempts: 3,
            start_to_close_timeout: Duration::from_secs(5),
            jitter: false,
        }
    }

    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            policy: self.clone(),
            retries_emitted: 0,
        }
    }
}

/// Iterator over the delays between attempts under a [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct BackoffSchedule {
    policy: RetryPolicy,
    retries_emitted: u32,
}

impl BackoffSchedule {
    /// Delay to sleep before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.retries_emitted;
        self.retries_emitted += 1;

        let base = self.policy.initial_interval.as_secs_f64()
            * self.policy.backoff_coefficient.powi(exponent as i32);
        let capped = base.min(self.policy.max_interval.as_secs_f64());
        let factor = if self.policy.jitter {
            rand::rng().random_range(0.8..1.2)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = RetryPolicy::default().without_jitter();
        let mut schedule = policy.schedule();
        assert_eq!(schedule.next_delay(), Duration::from_secs(3));
        assert_eq!(schedule.next_delay(), Duration::from_secs(6));
        assert_eq!(schedule.next_delay(), Duration::from_secs(12));
        assert_eq!(schedule.next_delay(), Duration::from_secs(15));
        assert_eq!(schedule.next_delay(), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut schedule = policy.schedule();
        for _ in 0..16 {
            let delay = schedule.next_delay().as_secs_f64();
            assert!((2.4..=18.0).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn attempts_floor_is_one() {
        let policy = RetryPolicy::default().with_maximum_attempts(0);
        assert_eq!(policy.maximum_attempts, 1);
    }
}
