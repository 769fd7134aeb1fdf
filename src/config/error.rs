//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Semantic validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("URL must use HTTPS: {0}")]
    InsecureUrl(&'static str),

    #[error("Invalid merchant serial number")]
    InvalidMerchantSerialNumber,

    #[error("Webhook timestamp tolerance must be between 1 and 3600 seconds")]
    InvalidTimestampTolerance,

    #[error("Retry attempts must be between 1 and 10")]
    InvalidRetryAttempts,

    #[error("Backoff base must not exceed backoff max")]
    InvalidBackoff,

    #[error("Rate limit requests and window must be positive")]
    InvalidRateLimit,

    #[error("Breaker threshold and cooldowns must be positive, max cooldown >= cooldown")]
    InvalidCircuitBreaker,

    #[error("Payment expiry must be between 1 and 1440 minutes")]
    InvalidExpiry,

    #[error("Sweep interval must be positive")]
    InvalidSweepInterval,
}
