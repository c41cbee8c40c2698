//! # Session Repository
//!
//! Session snapshots and guarded status transitions.
//!
//! ## Session Lifecycle (storage view)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Session Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE                                                              │
//! │     └── insert() → status 'active'                                      │
//! │         (partial unique index rejects a second active per register)     │
//! │                                                                         │
//! │  2. CHECKPOINT                                                          │
//! │     └── update_snapshot() → cart/customer/totals, status untouched      │
//! │                                                                         │
//! │  3. TRANSITIONS (all conditional UPDATEs; 0 rows = wrong status)        │
//! │     ├── hold()    active → held                                         │
//! │     ├── resume()  held → active (index can reject: register busy)       │
//! │     ├── void()    active|held → voided                                  │
//! │     ├── expire()  active|held → expired                                 │
//! │     └── complete() active+completing → completed (finalizer only)       │
//! │                                                                         │
//! │  Rows are NEVER deleted. Terminal statuses are the audit trail.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use till_core::{Cart, CustomerInfo, Session, SessionStatus};

/// Raw session row; cart and customer are JSON snapshot columns.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    store_id: String,
    register_number: String,
    cashier_id: Option<String>,
    status: SessionStatus,
    cart_json: String,
    customer_id: Option<String>,
    customer_json: Option<String>,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    held_at: Option<DateTime<Utc>>,
    hold_reason: Option<String>,
    void_reason: Option<String>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> DbResult<Session> {
        let cart: Cart = serde_json::from_str(&self.cart_json)?;
        let customer: Option<CustomerInfo> = match self.customer_json.as_deref() {
            Some(json) => Some(serde_json::from_str(json)?),
            None => None,
        };
        Ok(Session {
            id: self.id,
            store_id: self.store_id,
            register_number: self.register_number,
            cashier_id: self.cashier_id,
            status: self.status,
            cart,
            customer_id: self.customer_id,
            customer,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            created_at: self.created_at,
            updated_at: self.updated_at,
            held_at: self.held_at,
            hold_reason: self.hold_reason,
            void_reason: self.void_reason,
            expires_at: self.expires_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, store_id, register_number, cashier_id, status, cart_json, \
     customer_id, customer_json, subtotal_cents, tax_cents, total_cents, \
     created_at, updated_at, held_at, hold_reason, void_reason, expires_at";

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Inserts a fresh session.
    ///
    /// A `DbError::UniqueViolation` here means the register already has an
    /// active session; the caller re-reads and attaches to it.
    pub async fn insert(&self, session: &Session) -> DbResult<()> {
        debug!(id = %session.id, register = %session.register_number, "Inserting session");

        let cart_json = serde_json::to_string(&session.cart)?;
        let customer_json = match &session.customer {
            Some(c) => Some(serde_json::to_string(c)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, store_id, register_number, cashier_id, status, cart_json,
                customer_id, customer_json, subtotal_cents, tax_cents, total_cents,
                completing, created_at, updated_at, held_at, hold_reason,
                void_reason, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&session.id)
        .bind(&session.store_id)
        .bind(&session.register_number)
        .bind(&session.cashier_id)
        .bind(session.status)
        .bind(cart_json)
        .bind(&session.customer_id)
        .bind(customer_json)
        .bind(session.subtotal_cents)
        .bind(session.tax_cents)
        .bind(session.total_cents)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.held_at)
        .bind(&session.hold_reason)
        .bind(&session.void_reason)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a session by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Gets the active session for a register, if any.
    pub async fn get_active(
        &self,
        store_id: &str,
        register_number: &str,
    ) -> DbResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE store_id = ?1 AND register_number = ?2 AND status = 'active'"
        ))
        .bind(store_id)
        .bind(register_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Lists held sessions for a store, oldest hold first.
    pub async fn list_held(&self, store_id: &str) -> DbResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE store_id = ?1 AND status = 'held' ORDER BY held_at"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// Persists an incremental snapshot (cart/customer/totals) without
    /// changing status. Returns false if the session is already terminal.
    pub async fn update_snapshot(&self, session: &Session) -> DbResult<bool> {
        let cart_json = serde_json::to_string(&session.cart)?;
        let customer_json = match &session.customer {
            Some(c) => Some(serde_json::to_string(c)?),
            None => None,
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                cart_json = ?2,
                customer_id = ?3,
                customer_json = ?4,
                cashier_id = ?5,
                subtotal_cents = ?6,
                tax_cents = ?7,
                total_cents = ?8,
                updated_at = ?9
            WHERE id = ?1 AND status IN ('active', 'held')
            "#,
        )
        .bind(&session.id)
        .bind(cart_json)
        .bind(&session.customer_id)
        .bind(customer_json)
        .bind(&session.cashier_id)
        .bind(session.subtotal_cents)
        .bind(session.tax_cents)
        .bind(session.total_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// active → held. Returns false when the session was not active.
    pub async fn hold(&self, id: &str, reason: Option<&str>) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                status = 'held', held_at = ?2, hold_reason = ?3, updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// held → active. Returns false when the session was not held.
    ///
    /// The partial unique index can reject this with a unique violation
    /// when the register already runs another active session.
    pub async fn resume(&self, id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                status = 'active', held_at = NULL, hold_reason = NULL, updated_at = ?2
            WHERE id = ?1 AND status = 'held'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// active|held → voided. Irreversible. Returns false when terminal.
    pub async fn void(&self, id: &str, reason: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                status = 'voided', void_reason = ?3, updated_at = ?2
            WHERE id = ?1 AND status IN ('active', 'held')
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// active|held → expired, applied lazily by whoever reads a session
    /// past its deadline. Returns false when already terminal.
    pub async fn expire(&self, id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sessions SET status = 'expired', updated_at = ?2
            WHERE id = ?1 AND status IN ('active', 'held')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claims the completion guard: at most one caller ever gets `true`
    /// for a session. Everything the finalizer does happens behind this.
    pub async fn claim_completing(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET completing = 1 WHERE id = ?1 AND status = 'active' AND completing = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Releases the completion guard after an aborted finalize, so the
    /// cashier can retry once the cart is corrected.
    pub async fn clear_completing(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET completing = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// active (guard claimed) → completed. Finalizer only.
    pub async fn complete(&self, id: &str, completed_at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET status = 'completed', updated_at = ?2
            WHERE id = ?1 AND status = 'active' AND completing = 1
            "#,
        )
        .bind(id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
