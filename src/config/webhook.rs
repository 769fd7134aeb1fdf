//! Webhook endpoint configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::webhook::{WebhookHeaderNames, DEFAULT_TOLERANCE_SECS};

/// Webhook endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Maximum clock skew accepted on the signed date header
    #[serde(default = "default_tolerance")]
    pub timestamp_tolerance_secs: i64,

    /// Names of the signed headers
    #[serde(default)]
    pub headers: WebhookHeaderNames,

    /// Reject deliveries from unknown sources outside production too
    #[serde(default)]
    pub enforce_source_check: bool,

    /// Take the peer address from `X-Forwarded-For`
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Deliveries accepted per peer within the window
    #[serde(default = "default_peer_requests")]
    pub peer_rate_limit_requests: u32,

    #[serde(default = "default_peer_window")]
    pub peer_rate_limit_window_secs: u32,
}

impl WebhookConfig {
    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timestamp_tolerance_secs <= 0 || self.timestamp_tolerance_secs > 3600 {
            return Err(ValidationError::InvalidTimestampTolerance);
        }
        if self.headers.date.is_empty()
            || self.headers.content_hash.is_empty()
            || self.headers.host.is_empty()
            || self.headers.authorization.is_empty()
        {
            return Err(ValidationError::MissingRequired("WEBHOOK__HEADERS"));
        }
        if self.peer_rate_limit_requests == 0 || self.peer_rate_limit_window_secs == 0 {
            return Err(ValidationError::InvalidRateLimit);
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: default_tolerance(),
            headers: WebhookHeaderNames::default(),
            enforce_source_check: false,
            trust_forwarded_for: false,
            peer_rate_limit_requests: default_peer_requests(),
            peer_rate_limit_window_secs: default_peer_window(),
        }
    }
}

fn default_tolerance() -> i64 {
    DEFAULT_TOLERANCE_SECS
}

fn default_peer_requests() -> u32 {
    300
}

fn default_peer_window() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.timestamp_tolerance_secs, 300);
        assert_eq!(config.headers.date, "x-ms-date");
        assert!(!config.trust_forwarded_for);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tolerance_bounds() {
        let config = WebhookConfig {
            timestamp_tolerance_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidTimestampTolerance)
        );
    }

    #[test]
    fn test_blank_header_name_rejected() {
        let mut config = WebhookConfig::default();
        config.headers.authorization = String::new();
        assert!(config.validate().is_err());
    }
}
