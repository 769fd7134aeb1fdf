//! Per-transaction serialization.
//!
//! Webhook processing, commands and the expiry sweep all take the lock for
//! the transaction reference before loading, mutating and saving it, so two
//! updates to the same transaction never interleave. Different references
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::PaymentReference;

/// Registry of async mutexes keyed by payment reference.
///
/// Entries are held weakly: once every guard and waiter for a reference is
/// gone its mutex is freed, and the stale map entry is pruned on a later
/// insert.
#[derive(Debug, Default)]
pub struct TransactionLocks {
    entries: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl TransactionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `reference`.
    pub async fn lock(&self, reference: &PaymentReference) -> OwnedMutexGuard<()> {
        let mutex = self.mutex_for(reference.as_str());
        mutex.lock_owned().await
    }

    fn mutex_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        entries.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        entries.insert(key.to_string(), Arc::downgrade(&mutex));
        mutex
    }

    /// Number of references with a live lock.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
