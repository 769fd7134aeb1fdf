//! Host notification port.
//!
//! Informs the surrounding application when a transaction reaches a
//! terminal or capture-eligible state.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{Transaction, TransactionState};

/// Snapshot sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionNotification {
    pub reference: String,
    pub provider_reference: Option<String>,
    pub state: TransactionState,
    pub amount: i64,
    pub currency: String,
    pub captured_amount: i64,
    pub refunded_amount: i64,
    pub occurred_at: Timestamp,
}

impl TransactionNotification {
    pub fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            reference: transaction.reference().to_string(),
            provider_reference: transaction.provider_reference().map(str::to_string),
            state: transaction.state(),
            amount: transaction.amount().value,
            currency: transaction.amount().currency.to_string(),
            captured_amount: transaction.captured_amount(),
            refunded_amount: transaction.refunded_amount(),
            occurred_at: Timestamp::now(),
        }
    }
}

/// Port for notifying the host application.
///
/// Delivery is best-effort from the core's perspective: a failed
/// notification is logged, never rolled back into the transaction.
#[async_trait]
pub trait HostNotifier: Send + Sync {
    async fn notify(&self, notification: TransactionNotification) -> Result<(), DomainError>;
}
