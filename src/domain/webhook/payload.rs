//! Inbound webhook payload.
//!
//! Parsed leniently from JSON, then checked for the fields the state machine
//! needs. `name` falls back to `state` for older payload shapes.

use serde::Deserialize;

use crate::domain::foundation::{Currency, PaymentReference};
use crate::domain::payment::{PaymentEvent, PaymentEventName};

use super::WebhookRejection;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    reference: Option<String>,
    name: Option<String>,
    state: Option<String>,
    psp_reference: Option<String>,
    amount: Option<RawAmount>,
    event_id: Option<String>,
    idempotency_key: Option<String>,
    msn: Option<String>,
    timestamp: Option<String>,
    success: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAmount {
    currency: Option<String>,
    value: Option<i64>,
}

/// A well-formed webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub reference: PaymentReference,
    pub name: PaymentEventName,
    /// Name exactly as sent, for the event store.
    pub raw_name: String,
    pub psp_reference: Option<String>,
    pub currency: Currency,
    pub value: i64,
    pub event_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub msn: Option<String>,
    pub timestamp: Option<String>,
    pub success: bool,
}

impl WebhookPayload {
    /// Parses and checks a raw body.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if the body is not JSON or lacks `reference`,
    /// `name`/`state`, `amount.currency` or `amount.value`.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookRejection> {
        let raw: RawPayload = serde_json::from_slice(body)
            .map_err(|e| WebhookRejection::MalformedPayload(format!("invalid JSON: {}", e)))?;

        let reference = raw
            .reference
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| missing("reference"))?;
        let reference = PaymentReference::new(reference)
            .map_err(|e| WebhookRejection::MalformedPayload(e.to_string()))?;

        let raw_name = raw
            .name
            .or(raw.state)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| missing("name"))?;

        let amount = raw.amount.ok_or_else(|| missing("amount"))?;
        let currency = amount.currency.ok_or_else(|| missing("amount.currency"))?;
        let currency = Currency::new(currency)
            .map_err(|e| WebhookRejection::MalformedPayload(e.to_string()))?;
        let value = amount.value.ok_or_else(|| missing("amount.value"))?;
        if value < 0 {
            return Err(WebhookRejection::MalformedPayload(format!(
                "amount.value must not be negative, got {}",
                value
            )));
        }

        Ok(Self {
            reference,
            name: PaymentEventName::parse(&raw_name),
            raw_name,
            psp_reference: raw.psp_reference.filter(|p| !p.is_empty()),
            currency,
            value,
            event_id: raw.event_id.filter(|e| !e.is_empty()),
            idempotency_key: raw.idempotency_key.filter(|k| !k.is_empty()),
            msn: raw.msn,
            timestamp: raw.timestamp,
            success: raw.success.unwrap_or(true),
        })
    }

    /// Key used for deduplication.
    ///
    /// `eventId`, else `idempotencyKey`, else `reference:name:content-hash`.
    pub fn dedup_key(&self, content_hash: &str) -> String {
        if let Some(event_id) = &self.event_id {
            return format!("event:{}", event_id);
        }
        if let Some(key) = &self.idempotency_key {
            return idempotency_dedup_key(key);
        }
        format!("derived:{}:{}:{}", self.reference, self.raw_name, content_hash)
    }

    /// Converts to the aggregate's input.
    pub fn to_event(&self) -> PaymentEvent {
        let mut event = PaymentEvent::new(self.name.clone())
            .with_amount(self.value, self.currency.clone())
            .with_success(self.success);
        if let Some(psp) = &self.psp_reference {
            event = event.with_psp_reference(psp.clone());
        }
        event
    }
}

/// Dedup key form of a provider idempotency key.
pub fn idempotency_dedup_key(key: &str) -> String {
    format!("idem:{}", key)
}

fn missing(field: &str) -> WebhookRejection {
    WebhookRejection::MalformedPayload(format!("missing field '{}'", field))
}
