//! Transaction repository port.
//!
//! Persistence contract the host storage layer fulfils for the
//! `Transaction` aggregate. Records are retained for audit; the core never
//! deletes them.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PaymentReference, Timestamp};
use crate::domain::payment::Transaction;

/// Repository port for Transaction aggregate persistence.
///
/// Same-reference writes are serialized by the caller (`TransactionLocks`),
/// so implementations need no optimistic locking.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Save a new transaction.
    ///
    /// # Errors
    ///
    /// - `DuplicateTransaction` if the reference already exists
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, transaction: &Transaction) -> Result<(), DomainError>;

    /// Update an existing transaction.
    ///
    /// # Errors
    ///
    /// - `TransactionNotFound` if the reference doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, transaction: &Transaction) -> Result<(), DomainError>;

    /// Find a transaction by its merchant reference.
    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Transaction>, DomainError>;

    /// Find `CREATED` transactions whose deadline passed before `now`.
    ///
    /// Returns at most `limit` transactions, oldest deadline first.
    async fn find_stale(&self, now: Timestamp, limit: u32) -> Result<Vec<Transaction>, DomainError>;
}
