//! Webhook rejection reasons.
//!
//! Every rejection is terminal for that delivery. The status code decides
//! whether the provider redelivers: 4xx stops, 5xx retries.

use axum::http::StatusCode;
use thiserror::Error;

/// Reasons a webhook delivery is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookRejection {
    /// Body is not JSON or lacks a required field.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A header needed for the canonical signature is absent or unusable.
    #[error("Missing headers: {0}")]
    MissingHeaders(String),

    /// Content hash header does not match the body.
    #[error("Content hash mismatch")]
    ContentHashMismatch,

    /// Date header outside the tolerance window, in either direction.
    #[error("Stale or future timestamp: {0}")]
    StaleOrFutureTimestamp(String),

    /// HMAC over the canonical headers does not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Request did not come from an allow-listed callback host.
    #[error("Untrusted source: {0}")]
    UntrustedSource(String),

    /// No transaction with this reference.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    /// Same dedup key seen before with a different payload.
    #[error("Conflicting duplicate for key {0}")]
    ConflictingDuplicate(String),

    /// Too many deliveries from this peer.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Event store or repository failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookRejection {
    /// Returns true if the provider should redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookRejection::Storage(_) | WebhookRejection::RateLimited { .. }
        )
    }

    /// Maps the rejection to the HTTP status returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookRejection::MalformedPayload(_) => StatusCode::BAD_REQUEST,

            WebhookRejection::MissingHeaders(_)
            | WebhookRejection::ContentHashMismatch
            | WebhookRejection::StaleOrFutureTimestamp(_)
            | WebhookRejection::InvalidSignature => StatusCode::UNAUTHORIZED,

            WebhookRejection::UntrustedSource(_) => StatusCode::FORBIDDEN,
            WebhookRejection::UnknownTransaction(_) => StatusCode::NOT_FOUND,
            WebhookRejection::ConflictingDuplicate(_) => StatusCode::CONFLICT,
            WebhookRejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // Provider redelivers on 5xx
            WebhookRejection::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable snake_case name for logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookRejection::MalformedPayload(_) => "malformed_payload",
            WebhookRejection::MissingHeaders(_) => "missing_headers",
            WebhookRejection::ContentHashMismatch => "content_hash_mismatch",
            WebhookRejection::StaleOrFutureTimestamp(_) => "stale_or_future_timestamp",
            WebhookRejection::InvalidSignature => "invalid_signature",
            WebhookRejection::UntrustedSource(_) => "untrusted_source",
            WebhookRejection::UnknownTransaction(_) => "unknown_transaction",
            WebhookRejection::ConflictingDuplicate(_) => "conflicting_duplicate",
            WebhookRejection::RateLimited { .. } => "rate_limited",
            WebhookRejection::Storage(_) => "storage",
        }
    }
}
