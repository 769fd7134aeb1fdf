//! ExpireStaleHandler - moves overdue CREATED transactions to EXPIRED.

use std::sync::Arc;

use crate::application::{PaymentCommandError, TransactionLocks};
use crate::domain::foundation::{PaymentReference, Timestamp};
use crate::ports::TransactionRepository;

use super::SideEffectRunner;

/// Transactions examined per sweep.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct ExpireStaleResult {
    pub expired: Vec<PaymentReference>,
    /// Candidates that changed state before the lock was taken.
    pub skipped: usize,
}

pub struct ExpireStaleHandler {
    transactions: Arc<dyn TransactionRepository>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
    batch_size: u32,
}

impl ExpireStaleHandler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        locks: Arc<TransactionLocks>,
        effects: Arc<SideEffectRunner>,
    ) -> Self {
        Self {
            transactions,
            locks,
            effects,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Expires every transaction still `CREATED` past its deadline at `now`.
    pub async fn handle(&self, now: Timestamp) -> Result<ExpireStaleResult, PaymentCommandError> {
        let candidates = self.transactions.find_stale(now, self.batch_size).await?;
        let mut result = ExpireStaleResult::default();

        for candidate in candidates {
            let reference = candidate.reference().clone();
            let _guard = self.locks.lock(&reference).await;

            // A webhook may have authorized it since the query.
            let mut transaction = match self.transactions.find_by_reference(&reference).await? {
                Some(transaction) => transaction,
                None => {
                    result.skipped += 1;
                    continue;
                }
            };

            let outcome = transaction.expire_if_stale(now);
            if !outcome.is_change() {
                result.skipped += 1;
                continue;
            }

            self.transactions.update(&transaction).await?;
            tracing::info!(reference = %reference, "Transaction expired");
            self.effects.run(&mut transaction, outcome.side_effects()).await;
            result.expired.push(reference);
        }

        Ok(result)
    }
}
