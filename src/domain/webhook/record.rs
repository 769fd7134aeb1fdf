//! Stored record of one accepted webhook delivery.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::payload::idempotency_dedup_key;
use super::WebhookPayload;

/// Append-only event store entry. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Unique key: event id, idempotency key, or a derived fallback.
    pub dedup_key: String,
    pub event_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub transaction_reference: String,
    pub event_name: String,
    /// Base64 SHA-256 of the raw body, to tell redeliveries from conflicts.
    pub payload_digest: String,
    pub received_at: Timestamp,
}

impl WebhookEventRecord {
    /// Builds the record for a validated payload.
    pub fn from_payload(payload: &WebhookPayload, payload_digest: &str, received_at: Timestamp) -> Self {
        Self {
            dedup_key: payload.dedup_key(payload_digest),
            event_id: payload.event_id.clone(),
            idempotency_key: payload.idempotency_key.clone(),
            transaction_reference: payload.reference.to_string(),
            event_name: payload.raw_name.clone(),
            payload_digest: payload_digest.to_string(),
            received_at,
        }
    }

    /// Every key this delivery is deduplicated under: the dedup key, plus
    /// the idempotency key when an event id took the primary slot.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec![self.dedup_key.clone()];
        if let Some(key) = &self.idempotency_key {
            let secondary = idempotency_dedup_key(key);
            if secondary != self.dedup_key {
                keys.push(secondary);
            }
        }
        keys
    }

    /// True if `self` repeats the event stored as `existing`.
    ///
    /// Either the body is byte-identical, or the provider resent the same
    /// idempotency key under a new event id for the same reference and name.
    pub fn is_redelivery_of(&self, existing: &WebhookEventRecord) -> bool {
        if self.payload_digest == existing.payload_digest {
            return true;
        }
        let resent = self.idempotency_key.is_some()
            && self.idempotency_key == existing.idempotency_key
            && self.event_id != existing.event_id;
        resent
            && self.transaction_reference == existing.transaction_reference
            && self.event_name.eq_ignore_ascii_case(&existing.event_name)
    }
}

/// Result of an atomic insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: bool,
}

impl InsertOutcome {
    pub fn inserted() -> Self {
        Self { inserted: true }
    }

    pub fn already_exists() -> Self {
        Self { inserted: false }
    }
}
