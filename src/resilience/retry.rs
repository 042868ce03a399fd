//! Bounded retry with exponential backoff and optional jitter.

use crate::resilience::classify::ErrorKind;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Policy governing how failed calls are retried.
///
/// Backoff for attempt `n` (1-based) is
/// `min(base_delay * exponential_base^(n-1), max_delay)`, with up to 10%
/// uniform jitter added when enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (not just retries).
    pub max_attempts: u32,
    /// Backoff for the first retry.
    pub base_delay: Duration,
    /// Ceiling applied to the computed backoff before jitter.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub exponential_base: f64,
    /// Whether to add uniform jitter on top of the computed delay.
    pub jitter: bool,
    /// Error kinds worth retrying; everything else fails fast.
    pub retry_on: HashSet<ErrorKind>,
    /// Per-call deadline; `None` means no deadline is imposed.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
            retry_on: [
                ErrorKind::Timeout,
                ErrorKind::NetworkError,
                ErrorKind::ToolFailure,
            ]
            .into_iter()
            .collect(),
            call_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff ceiling.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the exponential growth factor.
    #[must_use]
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the set of retryable error kinds.
    #[must_use]
    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    /// Sets a per-call deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Returns whether an error of the given kind should be retried.
    #[must_use]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Computes the backoff before retry attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent as i32);
        let mut delay = raw.min(self.max_delay.as_secs_f64());

        if self.jitter {
            delay += delay * 0.1 * rand::thread_rng().gen::<f64>();
        }

        Duration::from_secs_f64(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::new().with_jitter(false);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_jitter(false)
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new();
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2).as_secs_f64();
            assert!((2.0..2.2).contains(&delay), "delay out of range: {delay}");
        }
    }

    #[test]
    fn test_default_retryable_kinds() {
        let policy = RetryPolicy::new();

        assert!(policy.is_retryable(ErrorKind::Timeout));
        assert!(policy.is_retryable(ErrorKind::NetworkError));
        assert!(policy.is_retryable(ErrorKind::ToolFailure));
        assert!(!policy.is_retryable(ErrorKind::ValidationError));
        assert!(!policy.is_retryable(ErrorKind::AgentFailure));
        assert!(!policy.is_retryable(ErrorKind::Unknown));
    }

    #[test]
    fn test_max_attempts_floor_is_one() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
