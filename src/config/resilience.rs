//! Outbound resilience configuration
//!
//! Timeouts, retries, rate limiting and circuit breaking for calls to the
//! provider API.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Total attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Outbound requests allowed per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u32,

    /// Consecutive failures that open the breaker
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,

    /// Cooldown before the first trial call
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,

    /// Cap for the extended cooldown after failed trial calls
    #[serde(default = "default_breaker_max_cooldown")]
    pub breaker_max_cooldown_secs: u64,

    /// Refresh access tokens this long before they expire
    #[serde(default = "default_token_refresh_margin")]
    pub token_refresh_margin_secs: u64,
}

impl ResilienceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn breaker_max_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_max_cooldown_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }

    /// Validate resilience configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ValidationError::InvalidRetryAttempts);
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if self.rate_limit_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(ValidationError::InvalidRateLimit);
        }
        if self.breaker_failure_threshold == 0
            || self.breaker_cooldown_secs == 0
            || self.breaker_max_cooldown_secs < self.breaker_cooldown_secs
        {
            return Err(ValidationError::InvalidCircuitBreaker);
        }
        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            breaker_max_cooldown_secs: default_breaker_max_cooldown(),
            token_refresh_margin_secs: default_token_refresh_margin(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    200
}

fn default_backoff_max() -> u64 {
    2_000
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window() -> u32 {
    60
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown() -> u64 {
    30
}

fn default_breaker_max_cooldown() -> u64 {
    300
}

fn default_token_refresh_margin() -> u64 {
    300
}
