//! In-memory circuit breaker.
//!
//! Counts consecutive failures, opens at the threshold and admits exactly
//! one trial call after the cooldown. A failed trial call reopens with the cooldown
//! multiplied, up to the configured cap. A trial call that never reports back
//! (its caller was cancelled) counts as failed once `trial_timeout` passes.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::ports::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    /// Failed trial calls since the circuit last closed.
    reopen_count: u32,
    half_open_in_flight: u32,
    trial_started: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    times_opened: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            open_until: None,
            reopen_count: 0,
            half_open_in_flight: 0,
            trial_started: None,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            times_opened: 0,
        }
    }

    fn open(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + config.cooldown_after(self.reopen_count));
        self.half_open_in_flight = 0;
        self.trial_started = None;
        self.times_opened += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.open_until = None;
        self.reopen_count = 0;
        self.half_open_in_flight = 0;
        self.trial_started = None;
    }

    fn fail_trial(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.consecutive_failures += 1;
        self.reopen_count += 1;
        self.open(config, now);
    }

    fn trial_overdue(&self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        self.trial_started
            .map(|started| now.duration_since(started) >= config.trial_timeout)
            .unwrap_or(false)
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.open_until.map(|until| now >= until).unwrap_or(true)
    }
}

/// Circuit breaker for one upstream host.
#[derive(Debug)]
pub struct InMemoryCircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl InMemoryCircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay meaningful after a panic elsewhere; keep going.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CircuitBreaker for InMemoryCircuitBreaker {
    fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if inner.cooldown_elapsed(Instant::now()) => CircuitState::HalfOpen,
            state => state,
        }
    }

    fn should_allow(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.cooldown_elapsed(now) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    inner.trial_started = Some(now);
                    tracing::info!(breaker = %self.name, "circuit half-open, admitting trial call");
                    true
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else if inner.trial_overdue(&self.config, now) {
                    inner.total_failures += 1;
                    inner.total_rejections += 1;
                    inner.fail_trial(&self.config, now);
                    tracing::warn!(
                        breaker = %self.name,
                        reopen_count = inner.reopen_count,
                        "trial call never reported back, circuit reopened"
                    );
                    false
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.close();
                tracing::info!(breaker = %self.name, "trial call succeeded, circuit closed");
            }
            // Late result from a request admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.total_failures += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.open(&self.config, now);
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.fail_trial(&self.config, now);
                tracing::warn!(
                    breaker = %self.name,
                    reopen_count = inner.reopen_count,
                    "trial call failed, circuit reopened"
                );
            }
            CircuitState::Open => inner.consecutive_failures += 1,
        }
    }

    fn reset(&self) {
        self.lock().close();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let now = Instant::now();
        let inner = self.lock();
        let time_until_half_open = match (inner.state, inner.open_until) {
            (CircuitState::Open, Some(until)) if until > now => Some(until - now),
            _ => None,
        };
        CircuitBreakerMetrics {
            state: Some(inner.state),
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            times_opened: inner.times_opened,
            total_rejections: inner.total_rejections,
            consecutive_failures: inner.consecutive_failures,
            time_until_half_open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(cooldown_ms: u64) -> InMemoryCircuitBreaker {
        InMemoryCircuitBreaker::new(
            "api.vipps.no",
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_millis(cooldown_ms),
                cooldown_multiplier: 2,
                max_recovery_timeout: Duration::from_millis(cooldown_ms * 3),
                half_open_max_requests: 1,
                trial_timeout: Duration::from_secs(10),
            },
        )
    }

    fn trip(breaker: &InMemoryCircuitBreaker) {
        for _ in 0..5 {
            assert!(breaker.should_allow());
            breaker.record_failure();
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Closed
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn starts_closed_and_allows() {
        let breaker = breaker(50);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.should_allow());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let breaker = breaker(50);
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 1);
    }

    // ══════════════════════════════════════════════════════════════
    // Open
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn opens_after_threshold_and_fails_fast() {
        let breaker = breaker(10_000);
        trip(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.should_allow());
        assert!(!breaker.should_allow());

        let metrics = breaker.metrics();
        assert_eq!(metrics.times_opened, 1);
        assert_eq!(metrics.total_rejections, 2);
        assert!(metrics.time_until_half_open.is_some());
    }

    // ══════════════════════════════════════════════════════════════
    // Half-open
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn exactly_one_trial_call_after_cooldown() {
        let breaker = breaker(30);
        trip(&breaker);
        std::thread::sleep(Duration::from_millis(40));

        assert!(breaker.should_allow(), "first trial call admitted");
        assert!(!breaker.should_allow(), "second concurrent trial call refused");
        assert!(!breaker.should_allow());
    }

    #[test]
    fn successful_trial_call_closes() {
        let breaker = breaker(30);
        trip(&breaker);
        std::thread::sleep(Duration::from_millis(40));

        assert!(breaker.should_allow());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.should_allow());
        assert!(breaker.should_allow());
    }

    #[test]
    fn failed_trial_call_reopens_with_longer_cooldown() {
        let breaker = breaker(30);
        trip(&breaker);
        std::thread::sleep(Duration::from_millis(40));

        assert!(breaker.should_allow());
        breaker.record_failure();
        assert_eq!(breaker.metrics().times_opened, 2);

        // Original cooldown is not enough any more (now 60ms)
        std::thread::sleep(Duration::from_millis(40));
        assert!(!breaker.should_allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.should_allow());
    }

    #[test]
    fn unreported_trial_call_reopens_instead_of_blocking_forever() {
        let breaker = InMemoryCircuitBreaker::new(
            "api.vipps.no",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_millis(10),
                cooldown_multiplier: 1,
                max_recovery_timeout: Duration::from_millis(10),
                half_open_max_requests: 1,
                trial_timeout: Duration::from_millis(50),
            },
        );
        assert!(breaker.should_allow());
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        // Trial call admitted, its caller goes away without recording a result
        assert!(breaker.should_allow());
        assert!(!breaker.should_allow());

        std::thread::sleep(Duration::from_millis(60));
        assert!(!breaker.should_allow(), "overdue trial call counts as failed");
        assert_eq!(breaker.metrics().state, Some(CircuitState::Open));
        assert_eq!(breaker.metrics().times_opened, 2);

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.should_allow(), "a fresh trial call is admitted");
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn reset_closes_immediately() {
        let breaker = breaker(10_000);
        trip(&breaker);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.should_allow());
    }
}
