//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresTransactionRepository` - Transaction aggregates
//! - `PostgresEventStore` - Webhook deduplication records

mod event_store;
mod transaction_repository;

pub use event_store::PostgresEventStore;
pub use transaction_repository::PostgresTransactionRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::domain::foundation::DomainError;

/// Opens a pool and applies the bundled migrations.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect to database: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))?;

    Ok(pool)
}
