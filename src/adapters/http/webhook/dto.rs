//! HTTP DTOs for the webhook endpoint.
//!
//! The provider only looks at the status code; the body is for humans
//! reading delivery logs in the provider portal.

use serde::{Deserialize, Serialize};

use crate::application::WebhookDisposition;
use crate::domain::webhook::WebhookRejection;

/// Body returned for every delivery, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAckResponse {
    /// `accepted`, `duplicate` or `rejected`.
    pub status: String,
    /// Outcome label for accepted deliveries, rejection kind otherwise.
    pub outcome: String,
}

impl From<&WebhookDisposition> for WebhookAckResponse {
    fn from(disposition: &WebhookDisposition) -> Self {
        Self {
            status: disposition.status().to_string(),
            outcome: disposition.outcome().to_string(),
        }
    }
}

impl From<&WebhookRejection> for WebhookAckResponse {
    fn from(rejection: &WebhookRejection) -> Self {
        Self {
            status: "rejected".to_string(),
            outcome: rejection.kind().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
