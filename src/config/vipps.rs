//! Vipps/MobilePay API configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::webhook::ProviderEnvironment;

/// Path the webhook router serves deliveries on.
pub const WEBHOOK_PATH: &str = "/webhooks/vipps";

/// Vipps/MobilePay API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VippsConfig {
    /// Provider environment (`test` or `production`)
    #[serde(default)]
    pub environment: ProviderEnvironment,

    /// API client id
    pub client_id: String,

    /// API client secret
    pub client_secret: SecretString,

    /// `Ocp-Apim-Subscription-Key`
    pub subscription_key: SecretString,

    /// Merchant serial number (MSN)
    pub merchant_serial_number: String,

    /// Overrides the environment's API base URL
    pub base_url: Option<String>,

    /// Public base URL of this gateway, used to register webhooks
    pub callback_base_url: String,

    #[serde(default = "default_system_name")]
    pub system_name: String,

    #[serde(default = "default_system_version")]
    pub system_version: String,

    #[serde(default = "default_system_name")]
    pub plugin_name: String,

    #[serde(default = "default_system_version")]
    pub plugin_version: String,
}

impl VippsConfig {
    /// Base URL outbound calls go to
    pub fn api_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.environment.api_base_url())
    }

    /// URL registered as the webhook target for every payment
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.callback_base_url.trim_end_matches('/'),
            WEBHOOK_PATH
        )
    }

    /// Validate API configuration
    ///
    /// Plain HTTP is tolerated outside production so a local mock can stand
    /// in for the provider.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.client_id.is_empty() {
            return Err(ValidationError::MissingRequired("VIPPS__CLIENT_ID"));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("VIPPS__CLIENT_SECRET"));
        }
        if self.subscription_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("VIPPS__SUBSCRIPTION_KEY"));
        }
        if self.merchant_serial_number.is_empty() {
            return Err(ValidationError::MissingRequired(
                "VIPPS__MERCHANT_SERIAL_NUMBER",
            ));
        }
        if !self
            .merchant_serial_number
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::InvalidMerchantSerialNumber);
        }
        if self.callback_base_url.is_empty() {
            return Err(ValidationError::MissingRequired("VIPPS__CALLBACK_BASE_URL"));
        }
        if production {
            if !self.callback_base_url.starts_with("https://") {
                return Err(ValidationError::InsecureUrl("VIPPS__CALLBACK_BASE_URL"));
            }
            if !self.api_base_url().starts_with("https://") {
                return Err(ValidationError::InsecureUrl("VIPPS__BASE_URL"));
            }
        }
        Ok(())
    }
}

fn default_system_name() -> String {
    "vipps-gateway".to_string()
}

fn default_system_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> VippsConfig {
        VippsConfig {
            environment: ProviderEnvironment::Test,
            client_id: "client-id".to_string(),
            client_secret: SecretString::new("client-secret".to_string()),
            subscription_key: SecretString::new("sub-key".to_string()),
            merchant_serial_number: "123456".to_string(),
            base_url: None,
            callback_base_url: "https://gateway.example/".to_string(),
            system_name: default_system_name(),
            system_version: default_system_version(),
            plugin_name: default_system_name(),
            plugin_version: default_system_version(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate(true).is_ok());
    }

    #[test]
    fn test_callback_url_joins_without_double_slash() {
        assert_eq!(
            valid().callback_url(),
            "https://gateway.example/webhooks/vipps"
        );
    }

    #[test]
    fn test_base_url_follows_environment_unless_overridden() {
        let mut config = valid();
        assert_eq!(config.api_base_url(), "https://apitest.vipps.no");

        config.environment = ProviderEnvironment::Production;
        assert_eq!(config.api_base_url(), "https://api.vipps.no");

        config.base_url = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(config.api_base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_missing_secret_is_reported() {
        let mut config = valid();
        config.client_secret = SecretString::new(String::new());
        assert_eq!(
            config.validate(false),
            Err(ValidationError::MissingRequired("VIPPS__CLIENT_SECRET"))
        );
    }

    #[test]
    fn test_msn_must_be_numeric() {
        let mut config = valid();
        config.merchant_serial_number = "12a456".to_string();
        assert_eq!(
            config.validate(false),
            Err(ValidationError::InvalidMerchantSerialNumber)
        );
    }

    #[test]
    fn test_plain_http_only_outside_production() {
        let mut config = valid();
        config.base_url = Some("http://127.0.0.1:9000".to_string());
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.validate(true),
            Err(ValidationError::InsecureUrl("VIPPS__BASE_URL"))
        );
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("client-secret"));
        assert!(!rendered.contains("sub-key"));
    }
}
