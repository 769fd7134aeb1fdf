//! CircuitBreaker port - Interface for upstream provider resilience.
//!
//! One breaker per upstream host, owned by the API client. State lives in
//! memory only; after a restart the worst case is one extra trial call.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests flow through
//! - **Open**: Too many consecutive failures, requests rejected immediately
//! - **Half-Open**: Cooldown elapsed, exactly one trial call allowed through
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold consecutive failures]--> Open
//! Open --[cooldown elapsed]--> Half-Open
//! Half-Open --[trial call succeeds]--> Closed
//! Half-Open --[trial call fails]--> Open (cooldown * multiplier, capped)
//! Half-Open --[trial call unresolved after trial_timeout]--> Open (as a failed trial call)
//! ```

use std::time::Duration;

/// Circuit breaker states for upstream protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests flow through to the provider.
    Closed,

    /// Too many failures - requests rejected without touching the network.
    Open,

    /// Cooldown elapsed - a single trial call decides.
    HalfOpen,
}

impl CircuitState {
    /// Check if the circuit allows requests through.
    pub fn allows_requests(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    ///
    /// Default: 5 failures
    pub failure_threshold: u32,

    /// Cooldown before the first trial call.
    ///
    /// Default: 30 seconds
    pub recovery_timeout: Duration,

    /// Factor applied to the cooldown each time a trial call fails.
    ///
    /// Default: 2
    pub cooldown_multiplier: u32,

    /// Upper bound for the extended cooldown.
    ///
    /// Default: 5 minutes
    pub max_recovery_timeout: Duration,

    /// Concurrent requests allowed in half-open state.
    ///
    /// Default: 1 request at a time
    pub half_open_max_requests: u32,

    /// How long an admitted trial call may stay unresolved before it counts as
    /// failed. A trial call whose caller was cancelled never reports back.
    ///
    /// Default: 30 seconds
    pub trial_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            cooldown_multiplier: 2,
            max_recovery_timeout: Duration::from_secs(300),
            half_open_max_requests: 1,
            trial_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config tuned for the payment provider (shorter first cooldown).
    pub fn for_payment_provider() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(15),
            cooldown_multiplier: 2,
            max_recovery_timeout: Duration::from_secs(240),
            half_open_max_requests: 1,
            trial_timeout: Duration::from_secs(30),
        }
    }

    /// Cooldown after `reopen_count` failed trial calls.
    pub fn cooldown_after(&self, reopen_count: u32) -> Duration {
        let factor = self
            .cooldown_multiplier
            .max(1)
            .saturating_pow(reopen_count.min(16));
        self.recovery_timeout
            .saturating_mul(factor)
            .min(self.max_recovery_timeout.max(self.recovery_timeout))
    }
}

/// Port for circuit breaker functionality.
///
/// # Example
///
/// ```ignore
/// if !breaker.should_allow() {
///     return Err(ApiError::CircuitOpen { host, retry_after });
/// }
///
/// match send(request).await {
///     Ok(response) => {
///         breaker.record_success();
///         Ok(response)
///     }
///     Err(e) if e.trips_breaker() => {
///         breaker.record_failure();
///         Err(e)
///     }
///     Err(e) => Err(e),
/// }
/// ```
pub trait CircuitBreaker: Send + Sync {
    /// Get the current state of the circuit.
    fn state(&self) -> CircuitState;

    /// Check if a request should be allowed through.
    ///
    /// In half-open state a `true` claims the trial call slot; every `true` must
    /// be followed by `record_success` or `record_failure`.
    fn should_allow(&self) -> bool;

    /// Record a successful request. Closes a half-open circuit.
    fn record_success(&self);

    /// Record a failed request.
    ///
    /// In closed state, this counts toward the failure threshold.
    /// In half-open state, this immediately reopens the circuit.
    fn record_failure(&self);

    /// Force reset the circuit to closed state.
    fn reset(&self);

    /// Get metrics about the circuit breaker.
    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: Option<CircuitState>,

    /// Total successful requests since creation
    pub total_successes: u64,

    /// Total failed requests since creation
    pub total_failures: u64,

    /// Times the circuit has opened
    pub times_opened: u64,

    /// Requests rejected while open
    pub total_rejections: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u32,

    /// Time until circuit transitions to half-open (when open)
    pub time_until_half_open: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_state_allows_requests() {
        assert!(CircuitState::Closed.allows_requests());
        assert!(CircuitState::HalfOpen.allows_requests());
        assert!(!CircuitState::Open.allows_requests());
    }

    #[test]
    fn default_config_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.half_open_max_requests, 1);
    }

    #[test]
    fn payment_provider_config() {
        let config = CircuitBreakerConfig::for_payment_provider();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(15));
    }

    #[test]
    fn cooldown_grows_by_multiplier_and_is_capped() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.cooldown_after(0), Duration::from_secs(30));
        assert_eq!(config.cooldown_after(1), Duration::from_secs(60));
        assert_eq!(config.cooldown_after(2), Duration::from_secs(120));
        assert_eq!(config.cooldown_after(3), Duration::from_secs(240));
        assert_eq!(config.cooldown_after(4), Duration::from_secs(300));
        assert_eq!(config.cooldown_after(40), Duration::from_secs(300));
    }
}
