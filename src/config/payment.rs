//! Payment lifecycle configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Payment lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Minutes a CREATED payment waits for the customer
    #[serde(default = "default_expiry_minutes")]
    pub default_expiry_minutes: u32,

    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl PaymentConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_expiry_minutes == 0 || self.default_expiry_minutes > 1440 {
            return Err(ValidationError::InvalidExpiry);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_expiry_minutes: default_expiry_minutes(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_expiry_minutes() -> u32 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PaymentConfig::default();
        assert_eq!(config.default_expiry_minutes, 60);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expiry_bounds() {
        let config = PaymentConfig {
            default_expiry_minutes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidExpiry));

        let config = PaymentConfig {
            default_expiry_minutes: 2000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidExpiry));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let config = PaymentConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidSweepInterval));
    }
}
