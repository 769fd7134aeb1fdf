//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

use crate::ports::ApiError;

/// How often and how patiently a failed call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3
    pub max_attempts: u32,

    /// Delay before the first retry. Default: 200ms
    pub base_delay: Duration,

    /// Upper bound for any single delay. Default: 2s
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether attempt number `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Delay before the retry that follows attempt `attempt` (1-based).
    ///
    /// The exponential delay is capped, then the upper half is jittered
    /// so simultaneous clients spread out.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);

        let half = delay / 2;
        let jitter_ms = half.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error() -> ApiError {
        ApiError::Upstream {
            status: 503,
            provider_code: None,
            trace_id: None,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn retries_until_attempts_exhausted() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, &server_error()));
        assert!(policy.should_retry(2, &server_error()));
        assert!(!policy.should_retry(3, &server_error()));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let bad_request = ApiError::Upstream {
            status: 400,
            provider_code: None,
            trace_id: None,
            message: "bad".to_string(),
        };
        assert!(!policy.should_retry(1, &bad_request));
    }

    #[test]
    fn none_policy_never_retries() {
        assert!(!RetryPolicy::none().should_retry(1, &server_error()));
    }

    #[test]
    fn backoff_grows_and_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let first = policy.backoff(1);
            assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(200));

            let second = policy.backoff(2);
            assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(400));

            let late = policy.backoff(10);
            assert!(late >= Duration::from_secs(1) && late <= Duration::from_secs(2));
        }
    }

    #[test]
    fn zero_base_delay_yields_no_wait() {
        let policy = RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }
}
