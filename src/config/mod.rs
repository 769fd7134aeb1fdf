//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `VIPPS_GATEWAY`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use vipps_gateway::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod database;
mod error;
mod payment;
mod resilience;
mod server;
mod vipps;
mod webhook;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use resilience::ResilienceConfig;
pub use server::{Environment, ServerConfig};
pub use vipps::{VippsConfig, WEBHOOK_PATH};
pub use webhook::WebhookConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Only the `vipps` section is required; every other section has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Provider credentials and endpoints
    pub vipps: VippsConfig,

    /// Inbound webhook verification
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Outbound timeouts, retries, rate limit and breaker
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Payment expiry
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Optional PostgreSQL persistence
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `VIPPS_GATEWAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `VIPPS_GATEWAY__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `VIPPS_GATEWAY__VIPPS__CLIENT_ID=...` -> `vipps.client_id = ...`
    /// - `VIPPS_GATEWAY__WEBHOOK__HEADERS__DATE=...` -> `webhook.headers.date = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("VIPPS_GATEWAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid value found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.vipps.validate(self.is_production())?;
        self.webhook.validate()?;
        self.resilience.validate()?;
        self.payment.validate()?;
        self.database.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::ProviderEnvironment;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const OPTIONAL_VARS: [&str; 6] = [
        "VIPPS_GATEWAY__SERVER__PORT",
        "VIPPS_GATEWAY__SERVER__ENVIRONMENT",
        "VIPPS_GATEWAY__VIPPS__ENVIRONMENT",
        "VIPPS_GATEWAY__WEBHOOK__TRUST_FORWARDED_FOR",
        "VIPPS_GATEWAY__WEBHOOK__HEADERS__DATE",
        "VIPPS_GATEWAY__RESILIENCE__MAX_ATTEMPTS",
    ];

    /// Sets the variables every deployment needs
    fn set_minimal_env() {
        env::set_var("VIPPS_GATEWAY__VIPPS__CLIENT_ID", "client-id");
        env::set_var("VIPPS_GATEWAY__VIPPS__CLIENT_SECRET", "client-secret");
        env::set_var("VIPPS_GATEWAY__VIPPS__SUBSCRIPTION_KEY", "sub-key");
        env::set_var("VIPPS_GATEWAY__VIPPS__MERCHANT_SERIAL_NUMBER", "123456");
        env::set_var(
            "VIPPS_GATEWAY__VIPPS__CALLBACK_BASE_URL",
            "https://gateway.example",
        );
    }

    fn clear_env() {
        env::remove_var("VIPPS_GATEWAY__VIPPS__CLIENT_ID");
        env::remove_var("VIPPS_GATEWAY__VIPPS__CLIENT_SECRET");
        env::remove_var("VIPPS_GATEWAY__VIPPS__SUBSCRIPTION_KEY");
        env::remove_var("VIPPS_GATEWAY__VIPPS__MERCHANT_SERIAL_NUMBER");
        env::remove_var("VIPPS_GATEWAY__VIPPS__CALLBACK_BASE_URL");
        for var in OPTIONAL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.vipps.client_id, "client-id");
        assert_eq!(config.vipps.merchant_serial_number, "123456");
        assert_eq!(config.vipps.environment, ProviderEnvironment::Test);
        assert!(!config.database.is_configured());
    }

    #[test]
    fn test_validate_full_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.webhook.timestamp_tolerance_secs, 300);
        assert_eq!(config.resilience.max_attempts, 3);
        assert_eq!(config.payment.default_expiry_minutes, 60);
        assert!(!config.database.is_configured());
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("VIPPS_GATEWAY__SERVER__PORT", "3000");
        env::set_var("VIPPS_GATEWAY__VIPPS__ENVIRONMENT", "production");
        env::set_var("VIPPS_GATEWAY__WEBHOOK__TRUST_FORWARDED_FOR", "true");
        env::set_var("VIPPS_GATEWAY__WEBHOOK__HEADERS__DATE", "x-custom-date");
        env::set_var("VIPPS_GATEWAY__RESILIENCE__MAX_ATTEMPTS", "5");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.vipps.environment, ProviderEnvironment::Production);
        assert!(config.webhook.trust_forwarded_for);
        assert_eq!(config.webhook.headers.date, "x-custom-date");
        assert_eq!(config.webhook.headers.host, "host");
        assert_eq!(config.resilience.max_attempts, 5);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("VIPPS_GATEWAY__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_missing_credentials_fail_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }
}
