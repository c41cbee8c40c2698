//! # Transaction Repository
//!
//! Immutable sale records. Insert-only: there is deliberately no UPDATE
//! statement in this file, and never will be.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use till_core::{Transaction, TransactionItem};

/// Repository for completed-sale records.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a transaction and its item snapshots atomically.
    ///
    /// The UNIQUE constraints on `transaction_number` and `session_id`
    /// are the last line of defense against double-finalization.
    pub async fn insert(
        &self,
        transaction: &Transaction,
        items: &[TransactionItem],
    ) -> DbResult<()> {
        debug!(
            id = %transaction.id,
            number = %transaction.transaction_number,
            lines = items.len(),
            "Inserting transaction"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, transaction_number, session_id, store_id, register_number,
                cashier_id, customer_id, customer_name, payment_method,
                subtotal_cents, tax_cents, total_cents, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.transaction_number)
        .bind(&transaction.session_id)
        .bind(&transaction.store_id)
        .bind(&transaction.register_number)
        .bind(&transaction.cashier_id)
        .bind(&transaction.customer_id)
        .bind(&transaction.customer_name)
        .bind(transaction.payment_method)
        .bind(transaction.subtotal_cents)
        .bind(transaction.tax_cents)
        .bind(transaction.total_cents)
        .bind(transaction.completed_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO transaction_items (
                    id, transaction_id, product_id, sku_id,
                    sku_code_snapshot, name_snapshot,
                    unit_price_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.transaction_id)
            .bind(&item.product_id)
            .bind(&item.sku_id)
            .bind(&item.sku_code_snapshot)
            .bind(&item.name_snapshot)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a transaction by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Transaction>> {
        let txn: Option<Transaction> = sqlx::query_as(
            "SELECT id, transaction_number, session_id, store_id, register_number, \
             cashier_id, customer_id, customer_name, payment_method, \
             subtotal_cents, tax_cents, total_cents, completed_at \
             FROM transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(txn)
    }

    /// Gets the transaction that finalized a session, if any.
    pub async fn get_by_session(&self, session_id: &str) -> DbResult<Option<Transaction>> {
        let txn: Option<Transaction> = sqlx::query_as(
            "SELECT id, transaction_number, session_id, store_id, register_number, \
             cashier_id, customer_id, customer_name, payment_method, \
             subtotal_cents, tax_cents, total_cents, completed_at \
             FROM transactions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(txn)
    }

    /// Gets a transaction by its human-legible number (receipt replay).
    pub async fn get_by_number(&self, number: &str) -> DbResult<Option<Transaction>> {
        let txn: Option<Transaction> = sqlx::query_as(
            "SELECT id, transaction_number, session_id, store_id, register_number, \
             cashier_id, customer_id, customer_name, payment_method, \
             subtotal_cents, tax_cents, total_cents, completed_at \
             FROM transactions WHERE transaction_number = ?1",
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(txn)
    }

    /// Counts transactions whose number starts with the given prefix.
    ///
    /// Used by the finalizer to pick the next per-register daily sequence.
    pub async fn count_with_prefix(&self, prefix: &str) -> DbResult<i64> {
        let pattern = format!("{prefix}%");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE transaction_number LIKE ?1",
        )
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Gets the frozen line items for a transaction, in insert order.
    pub async fn get_items(&self, transaction_id: &str) -> DbResult<Vec<TransactionItem>> {
        let items: Vec<TransactionItem> = sqlx::query_as(
            "SELECT id, transaction_id, product_id, sku_id, \
             sku_code_snapshot, name_snapshot, \
             unit_price_cents, quantity, line_total_cents \
             FROM transaction_items WHERE transaction_id = ?1 ORDER BY rowid",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
