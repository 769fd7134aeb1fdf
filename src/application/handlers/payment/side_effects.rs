//! SideEffectRunner - executes the work a transition asks for.
//!
//! Runs after the transition is persisted and while the caller still holds
//! the transaction lock. Failures are logged and never undo the transition.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::foundation::IdempotencyKey;
use crate::domain::payment::{SideEffect, Transaction};
use crate::ports::{HostNotifier, PaymentGateway, TransactionNotification, TransactionRepository};

use super::capture_payment::perform_capture;

pub struct SideEffectRunner {
    gateway: Arc<dyn PaymentGateway>,
    transactions: Arc<dyn TransactionRepository>,
    notifier: Arc<dyn HostNotifier>,
}

impl SideEffectRunner {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        transactions: Arc<dyn TransactionRepository>,
        notifier: Arc<dyn HostNotifier>,
    ) -> Self {
        Self {
            gateway,
            transactions,
            notifier,
        }
    }

    /// Executes `effects` in order. An auto-capture appends the effects of
    /// its own transition to the queue.
    pub async fn run(&self, transaction: &mut Transaction, effects: &[SideEffect]) {
        let mut queue: VecDeque<SideEffect> = effects.iter().cloned().collect();

        while let Some(effect) = queue.pop_front() {
            match effect {
                SideEffect::CaptureRequested { amount } => {
                    let key = IdempotencyKey::generate();
                    match perform_capture(
                        self.gateway.as_ref(),
                        self.transactions.as_ref(),
                        transaction,
                        amount,
                        &key,
                    )
                    .await
                    {
                        Ok(outcome) => {
                            tracing::info!(
                                reference = %transaction.reference(),
                                amount,
                                "Auto-capture completed"
                            );
                            queue.extend(outcome.side_effects().iter().cloned());
                        }
                        Err(e) => {
                            tracing::warn!(
                                reference = %transaction.reference(),
                                amount,
                                error = %e,
                                "Auto-capture failed, transaction stays AUTHORIZED"
                            );
                        }
                    }
                }
                SideEffect::NotifyHost { state } => {
                    let notification = TransactionNotification::from_transaction(transaction);
                    if let Err(e) = self.notifier.notify(notification).await {
                        tracing::warn!(
                            reference = %transaction.reference(),
                            state = %state,
                            error = %e,
                            "Host notification failed"
                        );
                    }
                }
                SideEffect::ReleaseWebhook { webhook_id } => {
                    if let Err(e) = self.gateway.delete_webhook(&webhook_id).await {
                        tracing::warn!(
                            reference = %transaction.reference(),
                            webhook_id = %webhook_id,
                            error = %e,
                            "Failed to release webhook subscription"
                        );
                    }
                }
            }
        }
    }
}
