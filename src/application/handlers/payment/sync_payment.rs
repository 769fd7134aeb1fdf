//! SyncPaymentHandler - reconciles a transaction with the provider's view.
//!
//! Used when a webhook may have been lost: fetches the payment and applies
//! the events its aggregate implies, in lifecycle order.

use std::sync::Arc;

use crate::application::{PaymentCommandError, TransactionLocks};
use crate::domain::foundation::PaymentReference;
use crate::domain::payment::{ApplyOutcome, TransactionState};
use crate::ports::{PaymentGateway, TransactionRepository};

use super::SideEffectRunner;

#[derive(Debug, Clone)]
pub struct SyncPaymentCommand {
    pub reference: PaymentReference,
}

#[derive(Debug, Clone)]
pub struct SyncPaymentResult {
    pub reference: PaymentReference,
    pub previous_state: TransactionState,
    pub state: TransactionState,
    pub captured_amount: i64,
    pub refunded_amount: i64,
    /// True if anything was persisted.
    pub changed: bool,
}

pub struct SyncPaymentHandler {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
}

impl SyncPaymentHandler {
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
        cmd: SyncPaymentCommand,
    ) -> Result<SyncPaymentResult, PaymentCommandError> {
        let _guard = self.locks.lock(&cmd.reference).await;

        let mut transaction = self
            .transactions
            .find_by_reference(&cmd.reference)
            .await?
            .ok_or_else(|| PaymentCommandError::not_found(&cmd.reference))?;
        let previous_state = transaction.state();

        let details = self.gateway.get_payment(&cmd.reference).await?;

        let mut changed = false;
        let mut side_effects = Vec::new();
        for event in details.derived_events() {
            match transaction.apply(&event) {
                ApplyOutcome::Rejected(err) => {
                    tracing::debug!(
                        reference = %cmd.reference,
                        event = %event.name,
                        reason = %err,
                        "Polled event not applicable"
                    );
                }
                outcome => {
                    changed |= outcome.is_change();
                    side_effects.extend(outcome.side_effects().iter().cloned());
                }
            }
        }

        if changed {
            self.transactions.update(&transaction).await?;
            tracing::info!(
                reference = %cmd.reference,
                from = %previous_state,
                to = %transaction.state(),
                provider_state = %details.state,
                "Transaction reconciled with provider"
            );
        }

        self.effects.run(&mut transaction, &side_effects).await;

        Ok(SyncPaymentResult {
            reference: cmd.reference,
            previous_state,
            state: transaction.state(),
            captured_amount: transaction.captured_amount(),
            refunded_amount: transaction.refunded_amount(),
            changed,
        })
    }
}
