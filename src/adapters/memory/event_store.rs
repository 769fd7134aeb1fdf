//! In-memory webhook event store.
//!
//! Insert is check-and-set under a single write lock, so concurrent
//! inserts sharing any key resolve to exactly one winner.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::domain::webhook::{InsertOutcome, WebhookEventRecord};
use crate::ports::EventStore;

#[derive(Debug, Default)]
struct Entries {
    /// By dedup key.
    records: HashMap<String, WebhookEventRecord>,
    /// Every key of every record, pointing at its dedup key.
    index: HashMap<String, String>,
}

impl Entries {
    fn matching(&self, record: &WebhookEventRecord) -> Option<&WebhookEventRecord> {
        record
            .keys()
            .iter()
            .find_map(|key| self.index.get(key))
            .and_then(|dedup_key| self.records.get(dedup_key))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.records.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, record: &WebhookEventRecord) -> Result<InsertOutcome, DomainError> {
        let mut entries = self.entries.write().await;
        if entries.matching(record).is_some() {
            return Ok(InsertOutcome::already_exists());
        }
        for key in record.keys() {
            entries.index.insert(key, record.dedup_key.clone());
        }
        entries
            .records
            .insert(record.dedup_key.clone(), record.clone());
        Ok(InsertOutcome::inserted())
    }

    async fn exists(&self, dedup_key: &str) -> Result<bool, DomainError> {
        Ok(self.entries.read().await.index.contains_key(dedup_key))
    }

    async fn find(&self, dedup_key: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .index
            .get(dedup_key)
            .and_then(|primary| entries.records.get(primary))
            .cloned())
    }

    async fn find_matching(
        &self,
        record: &WebhookEventRecord,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.entries.read().await.matching(record).cloned())
    }
}
