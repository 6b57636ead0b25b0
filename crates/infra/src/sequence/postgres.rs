//! Postgres-backed invoice sequences.
//!
//! Tables used:
//!
//! ```sql
//! CREATE TABLE invoice_sequences (
//!     invoice_type TEXT        NOT NULL,
//!     year         INTEGER     NOT NULL,
//!     last_value   BIGINT      NOT NULL DEFAULT 0,
//!     updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (invoice_type, year)
//! );
//!
//! -- existing invoices, read for collision checks
//! CREATE UNIQUE INDEX invoices_invoice_number_key ON invoices (invoice_number);
//! ```
//!
//! ## Locking
//!
//! `allocate` runs in one transaction: the sequence row is created lazily
//! (`ON CONFLICT DO NOTHING`), locked with `SELECT … FOR UPDATE`, candidates
//! are checked against `invoices` while the lock is held, and the accepted
//! value is written back before commit. Exhaustion rolls the transaction back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | SequenceError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (lock not available / deadlock) | `55P03` / `40P01` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use billing_invoicing::NumberFormat;

use super::{AllocatedNumber, InvoiceSequenceStore, SequenceKey};
use crate::error::SequenceError;

#[derive(Debug, Clone)]
pub struct PostgresInvoiceSequenceStore {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    #[instrument(
        skip(self, format),
        fields(key = %key, attempts = tracing::field::Empty),
        err
    )]
    pub async fn allocate_async(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        max_attempts: u32,
    ) -> Result<AllocatedNumber, SequenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let last = lock_sequence_row(&mut tx, key).await?;

        let mut candidate = last;
        for attempt in 1..=max_attempts {
            candidate += 1;
            let number = format.format(&key.invoice_type, key.year, candidate);

            if invoice_number_exists(&mut tx, &number).await? {
                tracing::debug!(%key, %number, attempt, "invoice number already taken");
                continue;
            }

            sqlx::query(
                r#"
                UPDATE invoice_sequences
                SET last_value = $3, updated_at = NOW()
                WHERE invoice_type = $1 AND year = $2
                "#,
            )
            .bind(key.invoice_type.as_str())
            .bind(key.year)
            .bind(candidate as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_sequence", e))?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;

            Span::current().record("attempts", attempt);
            return Ok(AllocatedNumber {
                key: key.clone(),
                sequence: candidate,
                number,
                attempts: attempt,
            });
        }

        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))?;
        Err(SequenceError::Exhausted {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn current_async(&self, key: &SequenceKey) -> Result<u64, SequenceError> {
        let row = sqlx::query(
            "SELECT last_value FROM invoice_sequences WHERE invoice_type = $1 AND year = $2",
        )
        .bind(key.invoice_type.as_str())
        .bind(key.year)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("current_sequence", e))?;

        match row {
            None => Ok(0),
            Some(row) => {
                let last: i64 = row
                    .try_get("last_value")
                    .map_err(|e| SequenceError::Backend(format!("failed to read last_value: {e}")))?;
                Ok(last.max(0) as u64)
            }
        }
    }
}

/// Create the row if missing, then lock it for the rest of the transaction.
async fn lock_sequence_row(tx: &mut Transaction<'_, Postgres>, key: &SequenceKey) -> Result<u64, SequenceError> {
    sqlx::query(
        r#"
        INSERT INTO invoice_sequences (invoice_type, year, last_value)
        VALUES ($1, $2, 0)
        ON CONFLICT (invoice_type, year) DO NOTHING
        "#,
    )
    .bind(key.invoice_type.as_str())
    .bind(key.year)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("ensure_sequence", e))?;

    let row = sqlx::query(
        r#"
        SELECT last_value
        FROM invoice_sequences
        WHERE invoice_type = $1 AND year = $2
        FOR UPDATE
        "#,
    )
    .bind(key.invoice_type.as_str())
    .bind(key.year)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_sequence", e))?;

    let last: i64 = row
        .try_get("last_value")
        .map_err(|e| SequenceError::Backend(format!("failed to read last_value: {e}")))?;
    Ok(last.max(0) as u64)
}

async fn invoice_number_exists(tx: &mut Transaction<'_, Postgres>, number: &str) -> Result<bool, SequenceError> {
    let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM invoices WHERE invoice_number = $1) AS taken")
        .bind(number)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_invoice_number", e))?;

    row.try_get("taken")
        .map_err(|e| SequenceError::Backend(format!("failed to read collision flag: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SequenceError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("55P03") | Some("40P01") => SequenceError::Conflict(msg),
                _ => SequenceError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => SequenceError::Backend(format!("connection pool closed in {operation}")),
        other => SequenceError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// The store trait is synchronous; bridge onto the ambient tokio runtime.

impl InvoiceSequenceStore for PostgresInvoiceSequenceStore {
    fn allocate(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        max_attempts: u32,
    ) -> Result<AllocatedNumber, SequenceError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SequenceError::Backend("PostgresInvoiceSequenceStore requires a tokio runtime".to_string())
        })?;
        handle.block_on(self.allocate_async(key, format, max_attempts))
    }

    fn current(&self, key: &SequenceKey) -> Result<u64, SequenceError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SequenceError::Backend("PostgresInvoiceSequenceStore requires a tokio runtime".to_string())
        })?;
        handle.block_on(self.current_async(key))
    }
}
