//! EventStore port - Append-only record of accepted webhook deliveries.
//!
//! Enables idempotent webhook handling. The provider may deliver the same
//! notification more than once because of:
//! - Network timeouts
//! - 5xx responses from our endpoint (triggers redelivery)
//! - Our endpoint answering but the provider not receiving it
//!
//! No update or delete operations exist; retention is someone else's job.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::webhook::{InsertOutcome, WebhookEventRecord};

/// Port for storing webhook event records.
///
/// `insert` must be atomic at the storage layer (unique keys on
/// `dedup_key` and `idempotency_key`, `ON CONFLICT DO NOTHING`): of two
/// concurrent inserts sharing any key exactly one observes
/// `inserted = true`.
///
/// # Example
///
/// ```ignore
/// let record = WebhookEventRecord::from_payload(&payload, &digest, Timestamp::now());
/// if !store.insert(&record).await?.inserted {
///     return Ok(Duplicate); // Skip reprocessing
/// }
/// ```
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a record unless one of its keys (`WebhookEventRecord::keys`)
    /// already exists.
    async fn insert(&self, record: &WebhookEventRecord) -> Result<InsertOutcome, DomainError>;

    /// Fast-path duplicate check.
    async fn exists(&self, dedup_key: &str) -> Result<bool, DomainError>;

    /// Fetch a stored record to compare payload digests.
    async fn find(&self, dedup_key: &str) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Fetch the stored record sharing any key with `record`.
    async fn find_matching(
        &self,
        record: &WebhookEventRecord,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;
}
