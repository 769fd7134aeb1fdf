//! CreatePaymentHandler - Command handler for initiating a payment.
//!
//! Registers a webhook subscription scoped to the new transaction before
//! the payment is created upstream, so the first callback can already be
//! verified with its secret.

use std::sync::Arc;

use crate::application::PaymentCommandError;
use crate::domain::foundation::{
    IdempotencyKey, Money, PaymentReference, Timestamp, ValidationError,
};
use crate::domain::payment::{
    CapturePolicy, PaymentError, PaymentEventKind, Transaction, TransactionState,
};
use crate::ports::{
    CreatePaymentRequest, PaymentGateway, RegisterWebhookRequest, TransactionRepository, UserFlow,
};

/// Default minutes a payment may stay `CREATED` before the sweep expires it.
pub const DEFAULT_EXPIRY_MINUTES: i64 = 60;

/// Longest expiry a caller may request (one day).
pub const MAX_EXPIRY_MINUTES: i64 = 1440;

/// Command to create a new payment.
#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub reference: PaymentReference,
    pub amount: Money,
    pub capture_policy: CapturePolicy,
    pub user_flow: UserFlow,
    pub return_url: String,
    pub customer_phone_number: Option<String>,
    pub description: Option<String>,
    /// Overrides the configured expiry.
    pub expires_in_minutes: Option<i64>,
}

/// Result of payment creation.
#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub reference: PaymentReference,
    pub state: TransactionState,
    /// Where to send the customer to approve the payment.
    pub redirect_url: Option<String>,
    pub provider_reference: Option<String>,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentConfig {
    /// Public URL the provider delivers webhooks to.
    pub callback_url: String,
    pub default_expiry_minutes: i64,
}

impl CreatePaymentConfig {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            default_expiry_minutes: DEFAULT_EXPIRY_MINUTES,
        }
    }

    pub fn with_default_expiry_minutes(mut self, minutes: i64) -> Self {
        self.default_expiry_minutes = minutes;
        self
    }
}

/// Handler for creating payments.
pub struct CreatePaymentHandler {
    transactions: Arc<dyn TransactionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    config: CreatePaymentConfig,
}

impl CreatePaymentHandler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        config: CreatePaymentConfig,
    ) -> Self {
        Self {
            transactions,
            gateway,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreatePaymentCommand,
    ) -> Result<CreatePaymentResult, PaymentCommandError> {
        // 1. References are single-use
        if self
            .transactions
            .find_by_reference(&cmd.reference)
            .await?
            .is_some()
        {
            return Err(PaymentCommandError::AlreadyExists(cmd.reference.to_string()));
        }

        // 2. Persist the CREATED transaction
        let minutes = cmd
            .expires_in_minutes
            .unwrap_or(self.config.default_expiry_minutes);
        let expires_at = (1..=MAX_EXPIRY_MINUTES)
            .contains(&minutes)
            .then(|| Timestamp::now().checked_plus_minutes(minutes))
            .flatten()
            .ok_or_else(|| {
                PaymentError::from(ValidationError::out_of_range(
                    "expires_in_minutes",
                    1,
                    MAX_EXPIRY_MINUTES,
                    minutes,
                ))
            })?;
        let mut transaction = Transaction::create(
            cmd.reference.clone(),
            cmd.amount.clone(),
            cmd.capture_policy,
            Some(expires_at),
        );
        self.transactions.insert(&transaction).await?;

        // 3. Register the per-transaction webhook and store its secret
        let subscription = self
            .gateway
            .register_webhook(
                RegisterWebhookRequest {
                    url: self.config.callback_url.clone(),
                    events: PaymentEventKind::all().map(|k| k.webhook_name()).collect(),
                },
                &IdempotencyKey::generate(),
            )
            .await?;
        let webhook_id = subscription.id.clone();
        transaction.attach_webhook(subscription)?;
        self.transactions.update(&transaction).await?;

        // 4. Create the payment upstream
        let request = CreatePaymentRequest {
            reference: cmd.reference.clone(),
            amount: cmd.amount,
            user_flow: cmd.user_flow,
            return_url: cmd.return_url,
            customer_phone_number: cmd.customer_phone_number,
            description: cmd.description,
        };
        let created = match self
            .gateway
            .create_payment(request, &IdempotencyKey::generate())
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_definitive_rejection() => {
                if let Err(release) = self.gateway.delete_webhook(&webhook_id).await {
                    tracing::warn!(
                        reference = %cmd.reference,
                        webhook_id = %webhook_id,
                        error = %release,
                        "Failed to release webhook after create failure"
                    );
                }
                tracing::warn!(reference = %cmd.reference, error = %e, "Payment creation refused");
                return Err(e.into());
            }
            Err(e) => {
                // The payment may exist upstream; keep listening for it.
                tracing::warn!(
                    reference = %cmd.reference,
                    webhook_id = %webhook_id,
                    error = %e,
                    "Payment creation outcome unknown, webhook kept"
                );
                return Err(e.into());
            }
        };

        // 5. Record the PSP reference if the provider returned one
        if let Some(psp) = created.psp_reference.as_deref() {
            if transaction.assign_provider_reference(psp)? {
                self.transactions.update(&transaction).await?;
            }
        }

        tracing::info!(
            reference = %cmd.reference,
            amount = transaction.amount().value,
            currency = %transaction.amount().currency,
            "Payment created"
        );

        Ok(CreatePaymentResult {
            reference: cmd.reference,
            state: transaction.state(),
            redirect_url: created.redirect_url,
            provider_reference: transaction.provider_reference().map(str::to_string),
            expires_at: transaction.expires_at(),
        })
    }
}
