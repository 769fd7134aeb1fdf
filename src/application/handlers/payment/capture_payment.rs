//! CapturePaymentHandler - Command handler for capturing an authorized payment.

use std::sync::Arc;

use crate::application::{PaymentCommandError, TransactionLocks};
use crate::domain::foundation::{IdempotencyKey, Money, PaymentReference};
use crate::domain::payment::{ApplyOutcome, PaymentError, Transaction, TransactionState};
use crate::ports::{PaymentGateway, TransactionRepository};

use super::SideEffectRunner;

/// Command to capture all or part of an authorized amount.
#[derive(Debug, Clone)]
pub struct CapturePaymentCommand {
    pub reference: PaymentReference,
    /// Minor units. `None` captures everything still capturable.
    pub amount: Option<i64>,
    /// Reuse the key of a failed attempt to retry it safely.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Result of a successful capture.
#[derive(Debug, Clone)]
pub struct CapturePaymentResult {
    pub reference: PaymentReference,
    pub state: TransactionState,
    pub captured_amount: i64,
    pub idempotency_key: IdempotencyKey,
}

/// Handler for capture commands.
pub struct CapturePaymentHandler {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
}

impl CapturePaymentHandler {
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
        cmd: CapturePaymentCommand,
    ) -> Result<CapturePaymentResult, PaymentCommandError> {
        let _guard = self.locks.lock(&cmd.reference).await;

        // 1. Load under the lock
        let mut transaction = self
            .transactions
            .find_by_reference(&cmd.reference)
            .await?
            .ok_or_else(|| PaymentCommandError::not_found(&cmd.reference))?;

        // 2. Capture upstream, then record locally
        let amount = cmd.amount.unwrap_or_else(|| transaction.capturable_amount());
        let key = cmd.idempotency_key.unwrap_or_else(IdempotencyKey::generate);
        let outcome = perform_capture(
            self.gateway.as_ref(),
            self.transactions.as_ref(),
            &mut transaction,
            amount,
            &key,
        )
        .await?;

        tracing::info!(
            reference = %cmd.reference,
            amount,
            state = %transaction.state(),
            "Payment captured"
        );

        // 3. Side effects (host notification)
        self.effects.run(&mut transaction, outcome.side_effects()).await;

        Ok(CapturePaymentResult {
            reference: cmd.reference,
            state: transaction.state(),
            captured_amount: transaction.captured_amount(),
            idempotency_key: key,
        })
    }
}

/// Captures `amount` upstream and records it on `transaction`.
///
/// The local precondition is checked before the API call; on any upstream
/// failure the transaction is left untouched. Callers must hold the
/// transaction lock.
pub(crate) async fn perform_capture(
    gateway: &dyn PaymentGateway,
    transactions: &dyn TransactionRepository,
    transaction: &mut Transaction,
    amount: i64,
    key: &IdempotencyKey,
) -> Result<ApplyOutcome, PaymentCommandError> {
    transaction.check_capture(amount)?;
    let money = Money::new(amount, transaction.amount().currency.clone())
        .map_err(PaymentError::from)?;

    let details = gateway
        .capture_payment(transaction.reference(), &money, key)
        .await?;

    if transaction.provider_reference().is_none() {
        if let Some(psp) = details.psp_reference.as_deref() {
            transaction.assign_provider_reference(psp)?;
        }
    }
    let outcome = transaction.record_capture(amount)?;
    transactions.update(transaction).await?;

    Ok(outcome)
}
