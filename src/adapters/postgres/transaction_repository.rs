//! PostgreSQL implementation of TransactionRepository.
//!
//! Provides persistent storage for Transaction aggregates using PostgreSQL.

use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, Money, PaymentReference, Timestamp,
};
use crate::domain::payment::{
    CapturePolicy, Transaction, TransactionParts, TransactionState, WebhookSubscription,
};
use crate::ports::TransactionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;

const SELECT_COLUMNS: &str = r#"
    SELECT reference, provider_reference, amount_value, currency, state, capture_policy,
           webhook_id, webhook_secret, captured_amount, refunded_amount,
           expires_at, created_at, updated_at
    FROM payment_transactions
"#;

/// PostgreSQL implementation of the TransactionRepository port.
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a transaction.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    reference: String,
    provider_reference: Option<String>,
    amount_value: i64,
    currency: String,
    state: String,
    capture_policy: String,
    webhook_id: Option<String>,
    webhook_secret: Option<String>,
    captured_amount: i64,
    refunded_amount: i64,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid stored {}: {}", field, err),
    )
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(row.currency.trim()).map_err(|e| corrupt("currency", e))?;
        let webhook = match (row.webhook_id, row.webhook_secret) {
            (Some(id), Some(secret)) => Some(WebhookSubscription::new(id, secret)),
            _ => None,
        };

        Transaction::from_parts(TransactionParts {
            reference: PaymentReference::new(row.reference).map_err(|e| corrupt("reference", e))?,
            provider_reference: row.provider_reference,
            amount: Money::new(row.amount_value, currency).map_err(|e| corrupt("amount", e))?,
            state: row
                .state
                .parse::<TransactionState>()
                .map_err(|e| corrupt("state", e))?,
            capture_policy: row
                .capture_policy
                .parse::<CapturePolicy>()
                .map_err(|e| corrupt("capture_policy", e))?,
            webhook,
            captured_amount: row.captured_amount,
            refunded_amount: row.refunded_amount,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
        .map_err(|e| corrupt("totals", e))
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> Result<(), DomainError> {
        let webhook = transaction.webhook();

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                reference, provider_reference, amount_value, currency, state, capture_policy,
                webhook_id, webhook_secret, captured_amount, refunded_amount,
                expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(transaction.reference().as_str())
        .bind(transaction.provider_reference())
        .bind(transaction.amount().value)
        .bind(transaction.amount().currency.as_str())
        .bind(transaction.state().as_str())
        .bind(transaction.capture_policy().as_str())
        .bind(webhook.map(|w| w.id.as_str()))
        .bind(webhook.map(|w| w.secret.expose_secret().as_str()))
        .bind(transaction.captured_amount())
        .bind(transaction.refunded_amount())
        .bind(transaction.expires_at().map(|t| *t.as_datetime()))
        .bind(transaction.created_at().as_datetime())
        .bind(transaction.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("payment_transactions_pkey") {
                    return DomainError::new(
                        ErrorCode::DuplicateTransaction,
                        format!("Transaction {} already exists", transaction.reference()),
                    );
                }
            }
            DomainError::database(format!("Failed to save transaction: {}", e))
        })?;

        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> Result<(), DomainError> {
        let webhook = transaction.webhook();

        // provider_reference is write-once; COALESCE keeps the stored value.
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions SET
                provider_reference = COALESCE(provider_reference, $2),
                state = $3,
                webhook_id = $4,
                webhook_secret = $5,
                captured_amount = $6,
                refunded_amount = $7,
                expires_at = $8,
                updated_at = $9
            WHERE reference = $1
            "#,
        )
        .bind(transaction.reference().as_str())
        .bind(transaction.provider_reference())
        .bind(transaction.state().as_str())
        .bind(webhook.map(|w| w.id.as_str()))
        .bind(webhook.map(|w| w.secret.expose_secret().as_str()))
        .bind(transaction.captured_amount())
        .bind(transaction.refunded_amount())
        .bind(transaction.expires_at().map(|t| *t.as_datetime()))
        .bind(transaction.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update transaction: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction {} not found", transaction.reference()),
            ));
        }

        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> =
            sqlx::query_as(&format!("{} WHERE reference = $1", SELECT_COLUMNS))
                .bind(reference.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find transaction: {}", e)))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn find_stale(&self, now: Timestamp, limit: u32) -> Result<Vec<Transaction>, DomainError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "{} WHERE state = 'CREATED' AND expires_at < $1 ORDER BY expires_at ASC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find stale transactions: {}", e)))?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}
