//! CancelPaymentHandler - Command handler for cancelling an uncaptured payment.

use std::sync::Arc;

use crate::application::{PaymentCommandError, TransactionLocks};
use crate::domain::foundation::{IdempotencyKey, PaymentReference};
use crate::domain::payment::TransactionState;
use crate::ports::{PaymentGateway, TransactionRepository};

use super::SideEffectRunner;

#[derive(Debug, Clone)]
pub struct CancelPaymentCommand {
    pub reference: PaymentReference,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone)]
pub struct CancelPaymentResult {
    pub reference: PaymentReference,
    pub state: TransactionState,
    pub idempotency_key: IdempotencyKey,
}

/// Cancels a payment in `CREATED` or `AUTHORIZED`.
pub struct CancelPaymentHandler {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
}

impl CancelPaymentHandler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<TransactionLocks>,
        effects: Arc<SideEffectRunner>,
    ) -> Self {
        Self {
            transactions,
            gateway,
            locks,
            effects,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelPaymentCommand,
    ) -> Result<CancelPaymentResult, PaymentCommandError> {
        let _guard = self.locks.lock(&cmd.reference).await;

        let mut transaction = self
            .transactions
            .find_by_reference(&cmd.reference)
            .await?
            .ok_or_else(|| PaymentCommandError::not_found(&cmd.reference))?;
        transaction.check_cancel()?;

        let key = cmd.idempotency_key.unwrap_or_else(IdempotencyKey::generate);
        self.gateway.cancel_payment(&cmd.reference, &key).await?;

        let outcome = transaction.record_cancel()?;
        self.transactions.update(&transaction).await?;

        tracing::info!(reference = %cmd.reference, "Payment cancelled");

        self.effects.run(&mut transaction, outcome.side_effects()).await;

        Ok(CancelPaymentResult {
            reference: cmd.reference,
            state: transaction.state(),
            idempotency_key: key,
        })
    }
}
