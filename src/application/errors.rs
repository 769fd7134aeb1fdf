//! Errors returned by payment command handlers.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | AlreadyExists | 409 |
//! | Payment | 400 or 409 |
//! | Gateway | 429, 502, 503 or 504 |
//! | Storage | 500 |

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::payment::PaymentError;
use crate::ports::ApiError;

#[derive(Debug, Clone, Error)]
pub enum PaymentCommandError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Transaction already exists: {0}")]
    AlreadyExists(String),

    /// Rejected by the aggregate before any provider call.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The provider call failed. Local state is unchanged.
    #[error("Provider call failed: {0}")]
    Gateway(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(DomainError),
}

impl From<DomainError> for PaymentCommandError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::TransactionNotFound => PaymentCommandError::NotFound(err.message),
            ErrorCode::DuplicateTransaction => PaymentCommandError::AlreadyExists(err.message),
            _ => PaymentCommandError::Storage(err),
        }
    }
}

impl PaymentCommandError {
    pub fn not_found(reference: impl std::fmt::Display) -> Self {
        PaymentCommandError::NotFound(reference.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentCommandError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentCommandError::AlreadyExists(_) => StatusCode::CONFLICT,
            PaymentCommandError::Payment(PaymentError::InvalidAmount { .. })
            | PaymentCommandError::Payment(PaymentError::CurrencyMismatch { .. })
            | PaymentCommandError::Payment(PaymentError::Validation(_)) => StatusCode::BAD_REQUEST,
            PaymentCommandError::Payment(_) => StatusCode::CONFLICT,
            PaymentCommandError::Gateway(ApiError::RateLimited { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            PaymentCommandError::Gateway(ApiError::CircuitOpen { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PaymentCommandError::Gateway(ApiError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            PaymentCommandError::Gateway(_) => StatusCode::BAD_GATEWAY,
            PaymentCommandError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True if the caller may try the same command again later.
    ///
    /// Local refusals (limiter, breaker) clear on their own, so they count.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentCommandError::Gateway(
                ApiError::RateLimited { .. } | ApiError::CircuitOpen { .. },
            ) => true,
            PaymentCommandError::Gateway(err) => err.is_retryable(),
            PaymentCommandError::Storage(_) => true,
            _ => false,
        }
    }
}
