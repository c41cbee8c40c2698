//! # Customer Repository
//!
//! Persisted customer records. A session carries an unvalidated
//! [`till_core::CustomerInfo`] draft; only the explicit save path turns a
//! draft into a row here and links its id back onto the session.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use till_core::{Customer, CustomerInfo};

const CUSTOMER_COLUMNS: &str = "id, store_id, name, email, phone, created_at, updated_at";

/// Repository for the customer directory.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Persists a draft as a customer record. The caller validates the
    /// draft first (till-core validation).
    pub async fn insert_from_draft(
        &self,
        store_id: &str,
        draft: &CustomerInfo,
    ) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            name: draft.name.trim().to_string(),
            email: draft.email.as_deref().map(str::trim).filter(|e| !e.is_empty()).map(str::to_string),
            phone: draft.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()).map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, store_id, name, email, phone, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.store_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer: Option<Customer> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }

    /// Searches customers by name or phone fragment.
    pub async fn search(&self, store_id: &str, query: &str, limit: i64) -> DbResult<Vec<Customer>> {
        let pattern = format!("%{}%", query.trim());
        let customers: Vec<Customer> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE store_id = ?1 AND (name LIKE ?2 OR phone LIKE ?2) \
             ORDER BY name LIMIT ?3"
        ))
        .bind(store_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
