//! # Domain Types
//!
//! Core domain types for Till POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Session      │   │   Transaction   │   │    Product      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id = SKU id    │       │
//! │  │  store/register │   │  txn_number     │   │  sku_code       │       │
//! │  │  status         │   │  item snapshots │   │  barcode        │       │
//! │  │  cart snapshot  │   │  totals, method │   │  price_cents    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Session is the ONLY mutable aggregate. Transaction is immutable        │
//! │  from the moment the finalizer writes it.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for relations
//! - Business key: (store_id, register_number), transaction_number, sku_code

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::Cart;
use crate::money::{Money, TaxRate};
use crate::DEFAULT_SESSION_TTL_HOURS;

// =============================================================================
// Session Status
// =============================================================================

/// The lifecycle status of a point-of-sale session.
///
/// ```text
///   active ──► held ──► active (resume)
///     │          │
///     │          └──► voided
///     ├──► voided
///     ├──► completed  (finalizer only)
///     └──► expired    (derived: now > expires_at, applied lazily on read)
/// ```
///
/// `Completed`, `Voided` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The live sale on a register. At most one per (store, register).
    Active,
    /// Paused sale; cart and customer snapshot preserved. Many may coexist.
    Held,
    /// Cancelled by the cashier. Holds released. Irreversible.
    Voided,
    /// Deadline passed before completion. Holds released on observation.
    Expired,
    /// Finalized into a transaction. Holds committed to stock.
    Completed,
}

impl SessionStatus {
    /// Terminal states admit no further transitions.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Voided | SessionStatus::Expired | SessionStatus::Completed
        )
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Active
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Held => "held",
            SessionStatus::Voided => "voided",
            SessionStatus::Expired => "expired",
            SessionStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on an external terminal (gateway out of scope).
    ExternalCard,
}

// =============================================================================
// Product (catalog read model)
// =============================================================================

/// A sellable SKU as the cart engine sees it.
///
/// One row per SKU: `id` is the SKU id the hold ledger keys on,
/// `product_id` groups variants (sizes/lengths) of the same product.
/// Catalog management is an external collaborator; this is read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// SKU identifier (UUID v4). The hold ledger keys on this.
    pub id: String,

    /// Parent product grouping variants of the same item.
    pub product_id: String,

    /// Store this SKU belongs to.
    pub store_id: String,

    /// Human-legible SKU code, e.g. "WIG-001".
    pub sku_code: String,

    /// Barcode (EAN-13, UPC-A, ...).
    pub barcode: Option<String>,

    /// Display name shown to the cashier and on the receipt.
    pub name: String,

    /// Unit price in cents.
    pub price_cents: i64,

    /// Variant size, if any.
    pub size: Option<String>,

    /// Variant length, if any.
    pub length: Option<String>,

    /// Image reference for the terminal UI.
    pub image_url: Option<String>,

    /// Soft-delete flag.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// An unvalidated customer draft living on a session.
///
/// Distinct from a persisted [`Customer`]: a session may carry a draft
/// without ever linking a `customer_id`, and the draft survives
/// hold/resume untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CustomerInfo {
    /// A draft counts as empty when no field carries content.
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.email.as_deref().map_or(true, |e| e.trim().is_empty())
            && self.phone.as_deref().map_or(true, |p| p.trim().is_empty())
    }
}

/// A persisted customer record, created only through explicit save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// One in-progress or paused sale at a specific register.
///
/// ## Invariants
/// - `(store_id, register_number)` has at most one `Active` session
///   (enforced by a partial unique index in till-db)
/// - cart lines are unique by line id, merged by SKU + attributes
/// - sessions are never physically deleted; terminal statuses are the
///   logical destruction, kept for audit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Store scope.
    pub store_id: String,

    /// Register within the store, e.g. "R1". Uniqueness scope for Active.
    pub register_number: String,

    /// Cashier running the sale, if signed in.
    pub cashier_id: Option<String>,

    pub status: SessionStatus,

    /// The cart snapshot. Owned exclusively by this session.
    pub cart: Cart,

    /// Linked persisted customer, once saved or selected from search.
    pub customer_id: Option<String>,

    /// Unvalidated customer draft captured at the register.
    pub customer: Option<CustomerInfo>,

    /// Cached totals, recomputed after every cart mutation.
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set when the session is placed on hold.
    pub held_at: Option<DateTime<Utc>>,
    pub hold_reason: Option<String>,

    /// Why the session was voided, kept for audit.
    pub void_reason: Option<String>,

    /// Deadline after which the session counts as expired.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh active session with an empty cart.
    pub fn new(store_id: &str, register_number: &str, cashier_id: Option<&str>) -> Self {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            register_number: register_number.to_string(),
            cashier_id: cashier_id.map(str::to_string),
            status: SessionStatus::Active,
            cart: Cart::new(),
            customer_id: None,
            customer: None,
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            created_at: now,
            updated_at: now,
            held_at: None,
            hold_reason: None,
            void_reason: None,
            expires_at: now + Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    /// Whether the deadline has passed at `now`.
    ///
    /// Expiry is derived, never scheduled: every read path must call this
    /// before trusting an `Active`/`Held` status.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.expires_at
    }

    /// Recomputes subtotal/tax/total from the cart at the given rate.
    ///
    /// Pure, and must run after every mutating cart call. The UI never
    /// invokes this independently with stale inputs.
    pub fn recompute_totals(&mut self, rate: TaxRate) {
        let totals = self.cart.totals(rate);
        self.subtotal_cents = totals.subtotal_cents;
        self.tax_cents = totals.tax_cents;
        self.total_cents = totals.total_cents;
        self.updated_at = Utc::now();
    }
}

/// Incremental snapshot applied by `updateSession`: cart/customer/totals
/// without a status change. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub cart: Option<Cart>,
    pub customer_id: Option<String>,
    pub customer: Option<CustomerInfo>,
    pub cashier_id: Option<String>,
}

// =============================================================================
// Transaction
// =============================================================================

/// An immutable record of a completed sale.
///
/// Created only by the transaction finalizer; never mutated afterwards.
/// Uses the snapshot pattern: items freeze sku/name/price at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,

    /// Unique human-legible number, e.g. "20260823-R1-0042".
    pub transaction_number: String,

    /// Session this transaction finalized. One-to-one.
    pub session_id: String,

    pub store_id: String,
    pub register_number: String,
    pub cashier_id: Option<String>,

    pub customer_id: Option<String>,
    /// Customer name frozen at completion (draft or linked record).
    pub customer_name: Option<String>,

    pub payment_method: PaymentMethod,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,

    pub completed_at: DateTime<Utc>,
}

/// A frozen line item in a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub sku_id: String,
    /// SKU code at time of sale (frozen).
    pub sku_code_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Held.is_terminal());
        assert!(SessionStatus::Voided.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("store1", "R1", Some("cashier-7"));
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.cart.is_empty());
        assert_eq!(session.total_cents, 0);
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn test_expiry_is_derived() {
        let mut session = Session::new("store1", "R1", None);
        let now = Utc::now();
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::hours(DEFAULT_SESSION_TTL_HOURS + 1)));

        // Terminal sessions never report expired.
        session.status = SessionStatus::Completed;
        assert!(!session.is_expired_at(now + Duration::hours(DEFAULT_SESSION_TTL_HOURS + 1)));
    }

    #[test]
    fn test_customer_draft_emptiness() {
        assert!(CustomerInfo::default().is_empty());
        let draft = CustomerInfo {
            name: "Amina".to_string(),
            email: None,
            phone: None,
        };
        assert!(!draft.is_empty());
    }
}
