//! Retry policy for failed jobs.
//!
//! A failed attempt is retried while the attempt count stays below the job's
//! budget. The delay before attempt `n + 1` is `base ^ n` whole seconds,
//! computed with integer arithmetic so it is deterministic and saturates
//! instead of overflowing.

use chrono::{DateTime, Utc};
use queuectl_config::RetryConfig;
use std::time::Duration;

/// Exponential retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: u32,
    max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(2)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let policy = Self::exponential(config.backoff_base);
        match config.max_delay_secs {
            Some(secs) => policy.with_max_delay(Duration::from_secs(secs)),
            None => policy,
        }
    }
}

impl RetryPolicy {
    /// Creates an exponential policy with the given base.
    #[must_use]
    pub const fn exponential(base: u32) -> Self {
        Self {
            base,
            max_delay: None,
        }
    }

    /// Caps every delay at `max_delay`.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Returns the backoff base.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Returns true if a job that has now failed `attempts` times gets
    /// another try.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32, max_retries: u32) -> bool {
        attempts < max_retries
    }

    /// Delay after the `attempts`-th failure: `base ^ attempts` seconds.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let secs = u64::from(self.base)
            .checked_pow(attempts)
            .unwrap_or(u64::MAX);
        let delay = Duration::from_secs(secs);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Time at which the job becomes eligible again.
    #[must_use]
    pub fn next_try_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        retry_at(now, self.delay_for_attempt(attempts))
    }
}

/// Computes `now + delay`, saturating at the latest representable time.
#[must_use]
pub fn retry_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential(2);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = RetryPolicy::exponential(3);
        let delays: Vec<Duration> = (1..10).map(|n| policy.delay_for_attempt(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_base_one_is_constant() {
        let policy = RetryPolicy::exponential(1);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(1));
    }

    #[test]
    fn test_overflow_saturates() {
        let policy = RetryPolicy::exponential(10);
        assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(u64::MAX));

        let now = Utc::now();
        assert_eq!(policy.next_try_at(now, 100), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential(2).with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, 2));
        assert!(!policy.should_retry(2, 2));
        assert!(!policy.should_retry(3, 2));
    }

    #[test]
    fn test_next_try_at() {
        let now = Utc::now();
        let at = RetryPolicy::exponential(2).next_try_at(now, 3);
        assert_eq!((at - now).num_seconds(), 8);
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_retries: 3,
            backoff_base: 5,
            max_delay_secs: Some(60),
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.base(), 5);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(60));
    }
}
