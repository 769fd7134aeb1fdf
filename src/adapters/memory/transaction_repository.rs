//! In-memory transaction repository.
//!
//! Stores transactions in a map keyed by reference. Useful for testing and
//! single-node deployments without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, PaymentReference, Timestamp};
use crate::domain::payment::{Transaction, TransactionState};
use crate::ports::TransactionRepository;

/// In-memory storage for transactions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions.
    pub async fn count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), DomainError> {
        let mut transactions = self.transactions.write().await;
        let key = transaction.reference().to_string();
        if transactions.contains_key(&key) {
            return Err(DomainError::new(
                ErrorCode::DuplicateTransaction,
                format!("Transaction {} already exists", key),
            ));
        }
        transactions.insert(key, transaction.clone());
        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> Result<(), DomainError> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(transaction.reference().as_str()) {
            Some(stored) => {
                *stored = transaction.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction {} not found", transaction.reference()),
            )),
        }
    }

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Transaction>, DomainError> {
        Ok(self.transactions.read().await.get(reference.as_str()).cloned())
    }

    async fn find_stale(&self, now: Timestamp, limit: u32) -> Result<Vec<Transaction>, DomainError> {
        let transactions = self.transactions.read().await;
        let mut stale: Vec<Transaction> = transactions
            .values()
            .filter(|t| t.state() == TransactionState::Created && t.is_stale(now))
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.expires_at());
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, Money};
    use crate::domain::payment::CapturePolicy;

    fn transaction(reference: &str, expires_at: Option<Timestamp>) -> Transaction {
        Transaction::create(
            PaymentReference::new(reference).unwrap(),
            Money::new(1000, Currency::nok()).unwrap(),
            CapturePolicy::Manual,
            expires_at,
        )
    }

    #[tokio::test]
    async fn insert_then_find() {
        let repo = InMemoryTransactionRepository::new();
        let tx = transaction("order-1", None);
        repo.insert(&tx).await.unwrap();

        let found = repo.find_by_reference(tx.reference()).await.unwrap().unwrap();
        assert_eq!(found.reference(), tx.reference());
        assert_eq!(found.state(), TransactionState::Created);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let repo = InMemoryTransactionRepository::new();
        let tx = transaction("order-1", None);
        repo.insert(&tx).await.unwrap();

        let err = repo.insert(&tx).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateTransaction);
    }

    #[tokio::test]
    async fn update_of_unknown_transaction_fails() {
        let repo = InMemoryTransactionRepository::new();
        let err = repo.update(&transaction("ghost", None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionNotFound);
    }

    #[tokio::test]
    async fn find_stale_returns_expired_created_transactions_oldest_first() {
        let repo = InMemoryTransactionRepository::new();
        let now = Timestamp::now();
        repo.insert(&transaction("late", Some(now.minus_secs(10)))).await.unwrap();
        repo.insert(&transaction("early", Some(now.minus_secs(600)))).await.unwrap();
        repo.insert(&transaction("fresh", Some(now.plus_secs(600)))).await.unwrap();
        repo.insert(&transaction("open", None)).await.unwrap();

        let stale = repo.find_stale(now, 10).await.unwrap();
        let refs: Vec<_> = stale.iter().map(|t| t.reference().to_string()).collect();
        assert_eq!(refs, vec!["early", "late"]);

        assert_eq!(repo.find_stale(now, 1).await.unwrap().len(), 1);
    }
}
