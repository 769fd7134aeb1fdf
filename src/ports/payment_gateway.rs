//! Payment gateway port for the provider's ePayment API.
//!
//! Defines the contract the application layer uses to talk to the
//! provider. The reqwest adapter adds token management, rate limiting, a
//! circuit breaker and retries behind this interface; the mock adapter
//! records calls for tests.
//!
//! # Design
//!
//! - **Idempotent**: every mutating call takes the caller's idempotency key,
//!   reused verbatim on retries of the same logical call
//! - **Typed failures**: `ApiError` tells retryable from permanent errors

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, IdempotencyKey, Money, PaymentReference,
};
use crate::domain::payment::{
    PaymentEvent, PaymentEventKind, PaymentEventName, WebhookSubscription,
};

/// Port for the provider's ePayment and webhook APIs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a payment. The provider answers with a redirect URL.
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<CreatedPayment, ApiError>;

    /// Fetch current state and aggregate amounts of a payment.
    async fn get_payment(&self, reference: &PaymentReference) -> Result<PaymentDetails, ApiError>;

    /// Capture part or all of an authorized amount.
    async fn capture_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError>;

    /// Cancel an uncaptured payment.
    async fn cancel_payment(
        &self,
        reference: &PaymentReference,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError>;

    /// Refund part or all of a captured amount.
    async fn refund_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError>;

    /// Register a webhook subscription. The returned secret is
    /// provider-issued and must be stored verbatim.
    async fn register_webhook(
        &self,
        request: RegisterWebhookRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<WebhookSubscription, ApiError>;

    /// List the merchant's webhook subscriptions.
    async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, ApiError>;

    /// Delete a webhook subscription.
    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ApiError>;
}

/// How the customer is taken through the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserFlow {
    #[default]
    WebRedirect,
    NativeRedirect,
    PushMessage,
    Qr,
}

/// Request to initiate a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentRequest {
    pub reference: PaymentReference,
    pub amount: Money,
    pub user_flow: UserFlow,
    /// Where the customer lands after the app flow.
    pub return_url: String,
    /// MSISDN, digits only, for push-message flows.
    pub customer_phone_number: Option<String>,
    /// Shown to the customer in the app.
    pub description: Option<String>,
}

/// Provider answer to a payment initiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPayment {
    pub reference: String,
    pub redirect_url: Option<String>,
    pub psp_reference: Option<String>,
}

/// Amounts the provider has processed for a payment, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAggregate {
    pub currency: Currency,
    pub authorized: i64,
    pub captured: i64,
    pub refunded: i64,
    pub cancelled: i64,
}

/// Provider view of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub reference: String,
    /// Provider state name (`CREATED`, `AUTHORIZED`, `ABORTED`, ...).
    pub state: String,
    pub psp_reference: Option<String>,
    pub aggregate: PaymentAggregate,
}

impl PaymentDetails {
    /// Events implied by this snapshot, in the order they must be applied.
    ///
    /// Amounts are reported cumulatively, so the events carry totals and
    /// the state machine's max-merge keeps re-application harmless.
    pub fn derived_events(&self) -> Vec<PaymentEvent> {
        let currency = &self.aggregate.currency;
        let with_psp = |event: PaymentEvent| match &self.psp_reference {
            Some(psp) => event.with_psp_reference(psp.clone()),
            None => event,
        };

        let state_event = PaymentEventName::parse(&self.state);
        let state_kind = state_event.kind();

        let mut events = Vec::new();
        if self.aggregate.authorized > 0 || state_kind == Some(PaymentEventKind::Authorized) {
            events.push(with_psp(PaymentEvent::new(PaymentEventKind::Authorized)));
        }
        if self.aggregate.captured > 0 {
            events.push(with_psp(
                PaymentEvent::new(PaymentEventKind::Captured)
                    .with_amount(self.aggregate.captured, currency.clone()),
            ));
        }
        if self.aggregate.refunded > 0 {
            events.push(with_psp(
                PaymentEvent::new(PaymentEventKind::Refunded)
                    .with_amount(self.aggregate.refunded, currency.clone()),
            ));
        }

        // Terminal states go last so the amounts above still land.
        let covered = matches!(
            state_kind,
            Some(PaymentEventKind::Authorized)
                | Some(PaymentEventKind::Captured)
                | Some(PaymentEventKind::Refunded)
        );
        if !covered {
            events.push(with_psp(PaymentEvent::new(state_event)));
        }
        events
    }
}

/// Request to register a webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
    /// Full event names, e.g. `epayments.payment.captured.v1`.
    pub events: Vec<String>,
}

/// A registered webhook subscription, without its secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
}

/// Errors from the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Local limiter refused the call; nothing was sent.
    #[error("rate limited for {host}, retry after {}s", retry_after.as_secs())]
    RateLimited { host: String, retry_after: Duration },

    /// Breaker is open; nothing was sent.
    #[error("circuit open for {host}")]
    CircuitOpen { host: String },

    /// Provider answered with a non-2xx status.
    #[error("provider returned {status}: {message}")]
    Upstream {
        status: u16,
        provider_code: Option<String>,
        trace_id: Option<String>,
        message: String,
    },

    #[error("request timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    #[error("network error: {0}")]
    Network(String),

    /// A 2xx body that doesn't match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Whether the client may retry the same call with the same key.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Upstream { status, .. } => *status >= 500 || *status == 429,
            ApiError::Timeout { .. } | ApiError::Network(_) => true,
            ApiError::RateLimited { .. }
            | ApiError::CircuitOpen { .. }
            | ApiError::InvalidResponse(_) => false,
        }
    }

    /// Whether the failure counts against the host's circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        match self {
            ApiError::Upstream { status, .. } => *status >= 500,
            ApiError::Timeout { .. } | ApiError::Network(_) => true,
            _ => false,
        }
    }

    /// HTTP status from the provider, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// True when the call certainly had no effect upstream: it was never
    /// sent, or the provider refused it with a final 4xx.
    ///
    /// Timeouts, network errors, 5xx and unreadable 2xx bodies leave the
    /// outcome unknown.
    pub fn is_definitive_rejection(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::CircuitOpen { .. } => true,
            ApiError::Upstream { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            ApiError::Timeout { .. } | ApiError::Network(_) | ApiError::InvalidResponse(_) => {
                false
            }
        }
    }
}

impl From<ApiError> for DomainError {
    fn from(err: ApiError) -> Self {
        let code = match &err {
            ApiError::RateLimited { .. } => ErrorCode::RateLimited,
            ApiError::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            _ => ErrorCode::ProviderError,
        };
        let mut domain = DomainError::new(code, err.to_string());
        if let ApiError::Upstream {
            status,
            provider_code,
            trace_id,
            ..
        } = &err
        {
            domain = domain.with_detail("status", status.to_string());
            if let Some(provider_code) = provider_code {
                domain = domain.with_detail("provider_code", provider_code.clone());
            }
            if let Some(trace_id) = trace_id {
                domain = domain.with_detail("trace_id", trace_id.clone());
            }
        }
        domain
    }
}
