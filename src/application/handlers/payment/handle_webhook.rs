//! HandleWebhookHandler - Command handler for provider webhook deliveries.

use std::sync::Arc;

use crate::application::{TransactionLocks, WebhookRequest, WebhookValidator};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{ApplyOutcome, TransactionState};
use crate::domain::webhook::WebhookRejection;
use crate::ports::TransactionRepository;

use super::SideEffectRunner;

/// What happened to an accepted delivery. All variants answer 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// First delivery; the event was applied.
    Applied {
        reference: String,
        /// `transitioned`, `updated` or `unchanged`.
        outcome: &'static str,
        state: TransactionState,
    },

    /// Same body seen before.
    Duplicate {
        reference: String,
        state: TransactionState,
    },

    /// Authentic but not applicable: out of order, unknown name, or
    /// reported unsuccessful. The transaction is untouched.
    Ignored { reference: String, reason: String },
}

impl WebhookDisposition {
    /// Value of `status` in the response body.
    pub fn status(&self) -> &'static str {
        match self {
            WebhookDisposition::Applied { .. } => "accepted",
            WebhookDisposition::Duplicate { .. } => "duplicate",
            WebhookDisposition::Ignored { .. } => "accepted",
        }
    }

    /// Value of `outcome` in the response body.
    pub fn outcome(&self) -> &'static str {
        match self {
            WebhookDisposition::Applied { outcome, .. } => outcome,
            WebhookDisposition::Duplicate { .. } => "duplicate",
            WebhookDisposition::Ignored { .. } => "ignored",
        }
    }
}

/// Handler for inbound webhook deliveries.
///
/// Validation runs outside the transaction lock; everything from reloading
/// the transaction to running side effects runs inside it.
pub struct HandleWebhookHandler {
    validator: Arc<WebhookValidator>,
    transactions: Arc<dyn TransactionRepository>,
    locks: Arc<TransactionLocks>,
    effects: Arc<SideEffectRunner>,
}

impl HandleWebhookHandler {
    pub fn new(
        validator: Arc<WebhookValidator>,
        transactions: Arc<dyn TransactionRepository>,
        locks: Arc<TransactionLocks>,
        effects: Arc<SideEffectRunner>,
    ) -> Self {
        Self {
            validator,
            transactions,
            locks,
            effects,
        }
    }

    pub async fn handle(
        &self,
        request: WebhookRequest,
    ) -> Result<WebhookDisposition, WebhookRejection> {
        self.handle_at(request, Timestamp::now()).await
    }

    /// Processes a delivery as if received at `now`.
    pub async fn handle_at(
        &self,
        request: WebhookRequest,
        now: Timestamp,
    ) -> Result<WebhookDisposition, WebhookRejection> {
        // 1. Authenticate and deduplicate
        let validated = self.validator.validate(&request, now).await?;

        let reference = validated.payload.reference.clone();
        let event_id = validated.record.dedup_key.as_str();
        let _guard = self.locks.lock(&reference).await;
        let storage_failed = |e: DomainError| {
            tracing::error!(
                reference = %reference,
                event_id = %event_id,
                error = %e,
                "Webhook rejected, storage failed"
            );
            WebhookRejection::Storage(e.to_string())
        };

        // 2. Reload under the lock; validation saw a possibly older copy
        let mut transaction = self
            .transactions
            .find_by_reference(&reference)
            .await
            .map_err(&storage_failed)?
            .ok_or_else(|| WebhookRejection::UnknownTransaction(reference.to_string()))?;

        // 3. Apply. Duplicates are applied again: the aggregate is
        //    idempotent, and this completes a delivery whose save failed.
        let outcome = transaction.apply(&validated.payload.to_event());
        if outcome.is_change() {
            self.transactions
                .update(&transaction)
                .await
                .map_err(&storage_failed)?;
        }

        let disposition = match &outcome {
            _ if validated.duplicate => WebhookDisposition::Duplicate {
                reference: reference.to_string(),
                state: transaction.state(),
            },
            ApplyOutcome::Rejected(err) => WebhookDisposition::Ignored {
                reference: reference.to_string(),
                reason: err.to_string(),
            },
            ApplyOutcome::Ignored { reason } => WebhookDisposition::Ignored {
                reference: reference.to_string(),
                reason: reason.clone(),
            },
            other => WebhookDisposition::Applied {
                reference: reference.to_string(),
                outcome: other.label(),
                state: transaction.state(),
            },
        };

        match &disposition {
            WebhookDisposition::Ignored { reason, .. } => tracing::info!(
                reference = %reference,
                event_id = %event_id,
                event = %validated.payload.raw_name,
                state = %transaction.state(),
                reason = %reason,
                "Webhook event ignored"
            ),
            _ => tracing::info!(
                reference = %reference,
                event_id = %event_id,
                event = %validated.payload.raw_name,
                state = %transaction.state(),
                outcome = disposition.outcome(),
                "Webhook processed"
            ),
        }

        // 4. Side effects, still under the lock
        self.effects.run(&mut transaction, outcome.side_effects()).await;

        Ok(disposition)
    }
}
