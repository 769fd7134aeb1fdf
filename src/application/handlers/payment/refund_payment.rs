//! RefundPaymentHandler - Command handler for refunding captured funds.

use std::sync::Arc;

use crate::application::{PaymentCommandError, TransactionLocks};
use crate::domain::foundation::{IdempotencyKey, Money, PaymentReference};
use crate::domain::payment::{PaymentError, TransactionState};
use crate::ports::{PaymentGateway, TransactionRepository};

use super::SideEffectRunner;

/// Command to refund all or part of the captured amount.
#[derive(Debug, Clone)]
pub struct RefundPaymentCommand {
    pub reference: PaymentReference,
    /// Minor units. `None` refunds everything still refundable.
    pub amount: Option<i64>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone)]
pub struct RefundPaymentResult {
    pub reference: PaymentReference,
    pub state: TransactionState,
    pub refunded_amount: i64,
    pub idempotency_key: IdempotencyKey,
}

pub struct RefundPaymentHandler {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
}

impl RefundPaymentHandler {
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
        cmd: RefundPaymentCommand,
    ) -> Result<RefundPaymentResult, PaymentCommandError> {
        let _guard = self.locks.lock(&cmd.reference).await;

        // 1. Load and check before touching the provider
        let mut transaction = self
            .transactions
            .find_by_reference(&cmd.reference)
            .await?
            .ok_or_else(|| PaymentCommandError::not_found(&cmd.reference))?;

        let amount = cmd.amount.unwrap_or_else(|| transaction.refundable_amount());
        transaction.check_refund(amount)?;
        let money = Money::new(amount, transaction.amount().currency.clone())
            .map_err(PaymentError::from)?;

        // 2. Refund upstream
        let key = cmd.idempotency_key.unwrap_or_else(IdempotencyKey::generate);
        self.gateway
            .refund_payment(&cmd.reference, &money, &key)
            .await?;

        // 3. Record and persist
        let outcome = transaction.record_refund(amount)?;
        self.transactions.update(&transaction).await?;

        tracing::info!(
            reference = %cmd.reference,
            amount,
            refunded = transaction.refunded_amount(),
            state = %transaction.state(),
            "Payment refunded"
        );

        // 4. Side effects (notification and webhook release on full refund)
        self.effects.run(&mut transaction, outcome.side_effects()).await;

        Ok(RefundPaymentResult {
            reference: cmd.reference,
            state: transaction.state(),
            refunded_amount: transaction.refunded_amount(),
            idempotency_key: key,
        })
    }
}
