//! Mock payment gateway for testing.
//!
//! Provides a configurable in-process implementation of `PaymentGateway`
//! for unit and integration tests. Supports:
//! - Simulated payment lifecycle with aggregate amounts
//! - Error injection per operation
//! - Call tracking, including idempotency keys

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::{IdempotencyKey, Money, PaymentReference};
use crate::domain::payment::WebhookSubscription;
use crate::ports::{
    ApiError, CreatePaymentRequest, CreatedPayment, PaymentAggregate, PaymentDetails,
    PaymentGateway, RegisterWebhookRequest, WebhookInfo,
};

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentGateway::new();
///
/// // Inject errors
/// mock.fail_next("capture_payment", ApiError::Network("reset".into()));
///
/// // Simulate the customer approving in the app
/// mock.authorize("order-1");
///
/// assert_eq!(mock.calls_to("capture_payment").len(), 1);
/// ```
#[derive(Default)]
pub struct MockPaymentGateway {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    payments: HashMap<String, PaymentDetails>,
    requested_amounts: HashMap<String, i64>,
    webhooks: HashMap<String, WebhookInfo>,
    webhook_counter: u32,

    /// One-shot errors by method name.
    next_errors: HashMap<String, Vec<ApiError>>,

    /// Errors returned on every call to a method.
    persistent_errors: HashMap<String, ApiError>,

    call_log: Vec<GatewayCall>,
}

/// Recorded call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub method: String,
    pub reference: Option<String>,
    pub amount: Option<i64>,
    pub idempotency_key: Option<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Queue an error for the next call to `method`. Queued errors are
    /// returned in order.
    pub fn fail_next(&self, method: &str, error: ApiError) {
        self.state()
            .next_errors
            .entry(method.to_string())
            .or_default()
            .push(error);
    }

    /// Fail every call to `method` until `clear_failures`.
    pub fn fail_always(&self, method: &str, error: ApiError) {
        self.state()
            .persistent_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.next_errors.clear();
        state.persistent_errors.clear();
    }

    /// Simulate the customer approving the payment.
    pub fn authorize(&self, reference: &str) {
        let mut state = self.state();
        let requested = state.requested_amounts.get(reference).copied().unwrap_or(0);
        if let Some(payment) = state.payments.get_mut(reference) {
            payment.state = "AUTHORIZED".to_string();
            payment.aggregate.authorized = requested;
        }
    }

    /// Overwrite the provider's view of a payment.
    pub fn set_payment(&self, details: PaymentDetails) {
        self.state()
            .payments
            .insert(details.reference.clone(), details);
    }

    pub fn payment(&self, reference: &str) -> Option<PaymentDetails> {
        self.state().payments.get(reference).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().call_log.clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<GatewayCall> {
        self.state()
            .call_log
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    pub fn registered_webhooks(&self) -> Vec<WebhookInfo> {
        self.state().webhooks.values().cloned().collect()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internals
    // ════════════════════════════════════════════════════════════════════════════

    /// Logs the call and returns an injected error, if any.
    fn record(
        &self,
        method: &str,
        reference: Option<&PaymentReference>,
        amount: Option<&Money>,
        idempotency_key: Option<&IdempotencyKey>,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.call_log.push(GatewayCall {
            method: method.to_string(),
            reference: reference.map(|r| r.to_string()),
            amount: amount.map(|a| a.value),
            idempotency_key: idempotency_key.map(|k| k.to_string()),
        });

        if let Some(queue) = state.next_errors.get_mut(method) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        if let Some(error) = state.persistent_errors.get(method) {
            return Err(error.clone());
        }
        Ok(())
    }

    fn not_found(reference: &PaymentReference) -> ApiError {
        ApiError::Upstream {
            status: 404,
            provider_code: Some("NotFound".to_string()),
            trace_id: None,
            message: format!("payment {} not found", reference),
        }
    }

    fn modify<F>(&self, reference: &PaymentReference, change: F) -> Result<PaymentDetails, ApiError>
    where
        F: FnOnce(&mut PaymentDetails),
    {
        let mut state = self.state();
        let payment = state
            .payments
            .get_mut(reference.as_str())
            .ok_or_else(|| Self::not_found(reference))?;
        change(payment);
        Ok(payment.clone())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<CreatedPayment, ApiError> {
        self.record(
            "create_payment",
            Some(&request.reference),
            Some(&request.amount),
            Some(idempotency_key),
        )?;

        let reference = request.reference.to_string();
        let psp_reference = format!("psp-{}", reference);
        let mut state = self.state();
        state
            .requested_amounts
            .insert(reference.clone(), request.amount.value);
        state
            .payments
            .entry(reference.clone())
            .or_insert_with(|| PaymentDetails {
                reference: reference.clone(),
                state: "CREATED".to_string(),
                psp_reference: Some(psp_reference.clone()),
                aggregate: PaymentAggregate {
                    currency: request.amount.currency.clone(),
                    authorized: 0,
                    captured: 0,
                    refunded: 0,
                    cancelled: 0,
                },
            });
        drop(state);

        Ok(CreatedPayment {
            redirect_url: Some(format!("https://mock.vipps.test/redirect/{}", reference)),
            reference,
            psp_reference: Some(psp_reference),
        })
    }

    async fn get_payment(&self, reference: &PaymentReference) -> Result<PaymentDetails, ApiError> {
        self.record("get_payment", Some(reference), None, None)?;
        self.payment(reference.as_str())
            .ok_or_else(|| Self::not_found(reference))
    }

    async fn capture_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        self.record("capture_payment", Some(reference), Some(amount), Some(idempotency_key))?;
        self.modify(reference, |payment| {
            payment.aggregate.captured += amount.value;
        })
    }

    async fn cancel_payment(
        &self,
        reference: &PaymentReference,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        self.record("cancel_payment", Some(reference), None, Some(idempotency_key))?;
        self.modify(reference, |payment| {
            payment.aggregate.cancelled =
                payment.aggregate.authorized - payment.aggregate.captured;
            payment.state = "TERMINATED".to_string();
        })
    }

    async fn refund_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        self.record("refund_payment", Some(reference), Some(amount), Some(idempotency_key))?;
        self.modify(reference, |payment| {
            payment.aggregate.refunded += amount.value;
        })
    }

    async fn register_webhook(
        &self,
        request: RegisterWebhookRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<WebhookSubscription, ApiError> {
        self.record("register_webhook", None, None, Some(idempotency_key))?;

        let mut state = self.state();
        state.webhook_counter += 1;
        let id = format!("wh-{}", state.webhook_counter);
        let secret = format!("mock-secret-{}", state.webhook_counter);
        state.webhooks.insert(
            id.clone(),
            WebhookInfo {
                id: id.clone(),
                url: request.url,
                events: request.events,
            },
        );
        Ok(WebhookSubscription::new(id, secret))
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, ApiError> {
        self.record("list_webhooks", None, None, None)?;
        Ok(self.registered_webhooks())
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ApiError> {
        self.record("delete_webhook", None, None, None)?;
        self.state().webhooks.remove(webhook_id);
        Ok(())
    }
}
