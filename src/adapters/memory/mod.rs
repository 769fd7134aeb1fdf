//! In-memory persistence adapters.
//!
//! Implement `TransactionRepository` and `EventStore` without a database,
//! for tests and single-node deployments.

mod event_store;
mod transaction_repository;

pub use event_store::InMemoryEventStore;
pub use transaction_repository::InMemoryTransactionRepository;
