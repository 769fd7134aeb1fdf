//! Payment domain errors.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | InvalidStateTransition | 409 |
//! | InvalidAmount | 400 |
//! | CurrencyMismatch | 400 |
//! | ProviderReferenceConflict | 409 |
//! | WebhookAlreadyAttached | 409 |
//! | Validation | 400 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

use super::TransactionState;

/// Errors raised by the transaction aggregate.
///
/// None of these are retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("cannot move transaction from {current} to {requested}: {reason}")]
    InvalidStateTransition {
        current: TransactionState,
        requested: TransactionState,
        reason: String,
    },

    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    #[error("currency mismatch: transaction is in {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("provider reference already set to '{existing}', refusing '{received}'")]
    ProviderReferenceConflict { existing: String, received: String },

    #[error("webhook subscription '{existing}' already attached")]
    WebhookAlreadyAttached { existing: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PaymentError {
    pub fn invalid_transition(
        current: TransactionState,
        requested: TransactionState,
        reason: impl Into<String>,
    ) -> Self {
        PaymentError::InvalidStateTransition {
            current,
            requested,
            reason: reason.into(),
        }
    }

    pub fn invalid_amount(amount: i64, reason: impl Into<String>) -> Self {
        PaymentError::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PaymentError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            PaymentError::InvalidAmount { .. } => ErrorCode::OutOfRange,
            PaymentError::CurrencyMismatch { .. } => ErrorCode::InvalidFormat,
            PaymentError::ProviderReferenceConflict { .. }
            | PaymentError::WebhookAlreadyAttached { .. } => ErrorCode::DuplicateTransaction,
            PaymentError::Validation(_) => ErrorCode::ValidationFailed,
        }
    }
}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
