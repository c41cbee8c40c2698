//! # Session Lifecycle & Cart Operations
//!
//! Every mutation follows the same discipline:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Ledger-First Mutation Order                             │
//! │                                                                         │
//! │  1. validate inputs (till-core validation)                              │
//! │  2. load the session LIVE (lazy expiry applied here)                    │
//! │  3. check status allows the operation                                   │
//! │  4. hold ledger change (reserve / adjust / release)                     │
//! │     └── Insufficient → error, session untouched                         │
//! │  5. cart mutation + recompute totals                                    │
//! │  6. persist snapshot                                                    │
//! │     └── 0 rows (session raced terminal) → roll the ledger back          │
//! │                                                                         │
//! │  The ledger moves before the cart, so a rejected reservation never      │
//! │  leaves a cart line without a matching hold.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use till_core::{
    validation, CoreError, CustomerInfo, Product, Session, SessionPatch, SessionStatus,
    MAX_CART_LINES,
};
use till_db::{ReserveOutcome, StockLevel};

use crate::error::EngineResult;
use crate::PosEngine;

// =============================================================================
// Outcome Types
// =============================================================================

/// A cart line whose hold could not be fully re-established on resume.
///
/// Resume still succeeds; the cashier corrects or drops the line before
/// completing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapsedLine {
    pub item_id: String,
    pub sku_id: String,
    /// Quantity the cart line carries.
    pub requested: i64,
    /// Quantity actually held after the resume attempt.
    pub held: i64,
}

/// Result of resuming a held session.
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub session: Session,
    /// Lines whose stock lapsed while the session sat on hold.
    pub lapsed: Vec<LapsedLine>,
}

// =============================================================================
// Session Lifecycle
// =============================================================================

impl PosEngine {
    /// Creates a fresh active session on a register.
    ///
    /// ## Errors
    /// `DuplicateActiveSession` when the register already runs one; the
    /// caller fetches and attaches to the existing session instead.
    pub async fn create_session(
        &self,
        store_id: &str,
        register_number: &str,
        cashier_id: Option<&str>,
    ) -> EngineResult<Session> {
        // An expired session still squatting on the register does not
        // block a new sale.
        if let Some(existing) = self.db().sessions().get_active(store_id, register_number).await? {
            if existing.is_expired_at(Utc::now()) {
                self.expire_now(&existing).await?;
            } else {
                return Err(CoreError::DuplicateActiveSession {
                    store_id: store_id.to_string(),
                    register_number: register_number.to_string(),
                }
                .into());
            }
        }

        let mut session = Session::new(store_id, register_number, cashier_id);
        session.expires_at = session.created_at + Duration::hours(self.config().session_ttl_hours);

        if let Err(e) = self.db().sessions().insert(&session).await {
            // Lost the race against another terminal on the same register.
            if e.is_unique_violation() {
                return Err(CoreError::DuplicateActiveSession {
                    store_id: store_id.to_string(),
                    register_number: register_number.to_string(),
                }
                .into());
            }
            return Err(e.into());
        }

        info!(
            session_id = %session.id,
            store_id,
            register_number,
            "Session created"
        );
        Ok(session)
    }

    /// The active session on a register, if any.
    ///
    /// Applies lazy expiry: an active session past its deadline is
    /// expired (holds released) and reported as absent.
    pub async fn active_session(
        &self,
        store_id: &str,
        register_number: &str,
    ) -> EngineResult<Option<Session>> {
        match self.db().sessions().get_active(store_id, register_number).await? {
            Some(session) if session.is_expired_at(Utc::now()) => {
                self.expire_now(&session).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Gets a session by id, applying lazy expiry first.
    ///
    /// Terminal sessions are returned as-is; this is a read, not a
    /// liveness check.
    pub async fn get_session(&self, id: &str) -> EngineResult<Session> {
        let session = self
            .db()
            .sessions()
            .get(id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;

        if session.is_expired_at(Utc::now()) {
            self.expire_now(&session).await?;
            return self
                .db()
                .sessions()
                .get(id)
                .await?
                .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
                .map_err(Into::into);
        }
        Ok(session)
    }

    /// Held sessions for a store, oldest first. Expired holds are lapsed
    /// on observation and dropped from the list.
    pub async fn list_held_sessions(&self, store_id: &str) -> EngineResult<Vec<Session>> {
        let now = Utc::now();
        let mut live = Vec::new();
        for session in self.db().sessions().list_held(store_id).await? {
            if session.is_expired_at(now) {
                self.expire_now(&session).await?;
            } else {
                live.push(session);
            }
        }
        Ok(live)
    }

    /// Pauses the active sale on a register, preserving cart, customer
    /// draft, and inventory holds.
    pub async fn hold_session(&self, id: &str, reason: Option<&str>) -> EngineResult<Session> {
        if let Some(reason) = reason {
            validation::validate_hold_reason(reason).map_err(CoreError::from)?;
        }

        let session = self.load_live(id).await?;
        self.require_active(&session)?;

        if !self.db().sessions().hold(id, reason).await? {
            return Err(self.wrong_status(id, SessionStatus::Active).await?);
        }

        info!(session_id = %id, "Session held");
        self.reload(id).await
    }

    /// Resumes a held session onto its register.
    ///
    /// Holds normally survive a hold/resume roundtrip untouched; resume
    /// still reconciles each cart line against the ledger and reports
    /// lines it could not fully cover as lapsed.
    pub async fn resume_session(&self, id: &str) -> EngineResult<ResumeOutcome> {
        let session = self.load_live(id).await?;
        if session.status != SessionStatus::Held {
            return Err(CoreError::InvalidSessionStatus {
                session_id: id.to_string(),
                current: session.status.to_string(),
                expected: SessionStatus::Held.to_string(),
            }
            .into());
        }

        match self.db().sessions().resume(id).await {
            Ok(true) => {}
            Ok(false) => return Err(self.wrong_status(id, SessionStatus::Held).await?),
            Err(e) if e.is_unique_violation() => {
                // Register picked up a new sale while this one sat held.
                return Err(CoreError::DuplicateActiveSession {
                    store_id: session.store_id.clone(),
                    register_number: session.register_number.clone(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        let stock = self.db().stock();
        let mut lapsed = Vec::new();
        for item in &session.cart.items {
            let held = stock.hold_quantity(id, &item.sku_id).await?;
            if held >= item.quantity {
                continue;
            }
            match stock.reserve(&item.sku_id, id, item.quantity - held).await? {
                ReserveOutcome::Reserved => {}
                ReserveOutcome::Insufficient { .. } => {
                    warn!(
                        session_id = %id,
                        sku_id = %item.sku_id,
                        requested = item.quantity,
                        held,
                        "Hold lapsed while session was held"
                    );
                    lapsed.push(LapsedLine {
                        item_id: item.id.clone(),
                        sku_id: item.sku_id.clone(),
                        requested: item.quantity,
                        held,
                    });
                }
            }
        }

        info!(session_id = %id, lapsed = lapsed.len(), "Session resumed");
        Ok(ResumeOutcome {
            session: self.reload(id).await?,
            lapsed,
        })
    }

    /// Cancels an active or held session. Irreversible; all holds are
    /// released back to availability.
    pub async fn void_session(&self, id: &str, reason: &str) -> EngineResult<Session> {
        validation::validate_hold_reason(reason).map_err(CoreError::from)?;

        let session = self.load_live(id).await?;
        if session.status.is_terminal() {
            return Err(self.wrong_status(id, SessionStatus::Active).await?);
        }

        // Claim the terminal status first; releasing holds is idempotent
        // and safe to repeat, voiding twice is not.
        if !self.db().sessions().void(id, reason).await? {
            return Err(self.wrong_status(id, SessionStatus::Active).await?);
        }
        self.db().stock().release(id).await?;

        info!(session_id = %id, reason, "Session voided");
        self.reload(id).await
    }

    /// Applies an incremental snapshot: cart, customer draft, linked
    /// customer, cashier. Fields left `None` are untouched.
    ///
    /// A replaced cart is reconciled against the hold ledger SKU by SKU;
    /// any line the ledger cannot cover rejects the whole patch.
    pub async fn update_session(&self, id: &str, patch: SessionPatch) -> EngineResult<Session> {
        let mut session = self.load_live(id).await?;
        if session.status.is_terminal() {
            return Err(self.wrong_status(id, SessionStatus::Active).await?);
        }

        let mut cart_patched = false;
        if let Some(cart) = patch.cart {
            if cart.line_count() > MAX_CART_LINES {
                return Err(CoreError::CartTooLarge { max: MAX_CART_LINES }.into());
            }
            for item in &cart.items {
                validation::validate_quantity(item.quantity).map_err(CoreError::from)?;
            }
            self.reconcile_holds(id, &cart).await?;
            session.cart = cart;
            cart_patched = true;
        }
        if let Some(draft) = patch.customer {
            session.customer = if draft.is_empty() { None } else { Some(draft) };
        }
        if let Some(customer_id) = patch.customer_id {
            session.customer_id = Some(customer_id);
        }
        if let Some(cashier_id) = patch.cashier_id {
            session.cashier_id = Some(cashier_id);
        }

        session.recompute_totals(self.config().tax_rate());
        if !self.db().sessions().update_snapshot(&session).await? {
            // Session raced terminal between load and write. The race
            // winner already settled the ledger (void/expire release,
            // commit consumes), so any holds the reconcile re-acquired
            // for this session must go back to availability.
            if cart_patched {
                warn!(session_id = %id, "Snapshot write lost to a terminal transition, releasing holds");
                self.db().stock().release(id).await?;
            }
            return Err(self.wrong_status(id, SessionStatus::Active).await?);
        }
        Ok(session)
    }

    /// Brings the ledger to the per-SKU quantities of `cart`, releasing
    /// holds for SKUs that vanished. Rolls back on the first shortfall.
    async fn reconcile_holds(&self, session_id: &str, cart: &till_core::Cart) -> EngineResult<()> {
        let stock = self.db().stock();
        let current: HashMap<String, i64> = stock
            .holds_for_session(session_id)
            .await?
            .into_iter()
            .collect();

        let mut desired: HashMap<&str, i64> = HashMap::new();
        for item in &cart.items {
            *desired.entry(item.sku_id.as_str()).or_insert(0) += item.quantity;
        }

        let mut applied: Vec<(String, i64)> = Vec::new();
        for (sku_id, quantity) in &desired {
            let prev = current.get(*sku_id).copied().unwrap_or(0);
            if *quantity == prev {
                continue;
            }
            match stock.adjust(sku_id, session_id, *quantity).await? {
                ReserveOutcome::Reserved => applied.push((sku_id.to_string(), prev)),
                ReserveOutcome::Insufficient { available } => {
                    for (sku, prev_qty) in &applied {
                        stock.adjust(sku, session_id, *prev_qty).await?;
                    }
                    return Err(CoreError::InsufficientStock {
                        sku_id: sku_id.to_string(),
                        available,
                        requested: *quantity,
                    }
                    .into());
                }
            }
        }

        for sku_id in current.keys() {
            if !desired.contains_key(sku_id.as_str()) {
                stock.release_for_sku(session_id, sku_id).await?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Cart Operations
// =============================================================================

impl PosEngine {
    /// Adds a SKU to the session's cart, reserving stock first.
    ///
    /// Adding a SKU already in the cart merges into the existing line;
    /// the ledger hold is incremented by exactly the added quantity.
    pub async fn add_to_cart(
        &self,
        session_id: &str,
        sku_id: &str,
        quantity: i64,
    ) -> EngineResult<Session> {
        validation::validate_quantity(quantity).map_err(CoreError::from)?;

        let mut session = self.load_live(session_id).await?;
        self.require_active(&session)?;

        let product = self
            .db()
            .products()
            .get_by_id(sku_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(sku_id.to_string()))?;

        // Dry-run the cart mutation before touching the ledger, so a cap
        // violation never leaves a stray hold.
        let mut cart = session.cart.clone();
        cart.add_item(&product, quantity).map_err(CoreError::from)?;

        let stock = self.db().stock();
        let prev_hold = stock.hold_quantity(session_id, sku_id).await?;
        match stock.reserve(sku_id, session_id, quantity).await? {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::Insufficient { available } => {
                debug!(session_id, sku_id, quantity, available, "Reserve rejected");
                return Err(CoreError::InsufficientStock {
                    sku_id: sku_id.to_string(),
                    available,
                    requested: quantity,
                }
                .into());
            }
        }

        session.cart = cart;
        session.recompute_totals(self.config().tax_rate());
        if !self.db().sessions().update_snapshot(&session).await? {
            // Session raced terminal between load and write; undo the hold.
            stock.adjust(sku_id, session_id, prev_hold).await?;
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        debug!(session_id, sku_id, quantity, "Item added to cart");
        Ok(session)
    }

    /// Sets a cart line to a new quantity. Zero or less removes the line
    /// and releases its hold.
    pub async fn update_cart_quantity(
        &self,
        session_id: &str,
        item_id: &str,
        quantity: i64,
    ) -> EngineResult<Session> {
        if quantity <= 0 {
            return self.remove_from_cart(session_id, item_id).await;
        }

        validation::validate_quantity(quantity).map_err(CoreError::from)?;

        let mut session = self.load_live(session_id).await?;
        self.require_active(&session)?;

        let sku_id = session
            .cart
            .item(item_id)
            .map(|i| i.sku_id.clone())
            .ok_or_else(|| CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            })?;

        let mut cart = session.cart.clone();
        cart.update_quantity(item_id, quantity).map_err(CoreError::from)?;

        // Lines merge by SKU, so the line quantity IS the session's
        // per-SKU target; adjust checks only the increase.
        let stock = self.db().stock();
        let prev_hold = stock.hold_quantity(session_id, &sku_id).await?;
        match stock.adjust(&sku_id, session_id, quantity).await? {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::Insufficient { available } => {
                return Err(CoreError::InsufficientStock {
                    sku_id,
                    available,
                    requested: quantity,
                }
                .into());
            }
        }

        session.cart = cart;
        session.recompute_totals(self.config().tax_rate());
        if !self.db().sessions().update_snapshot(&session).await? {
            stock.adjust(&sku_id, session_id, prev_hold).await?;
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        debug!(session_id, item_id, quantity, "Cart quantity updated");
        Ok(session)
    }

    /// Removes a cart line and releases its hold.
    pub async fn remove_from_cart(&self, session_id: &str, item_id: &str) -> EngineResult<Session> {
        let mut session = self.load_live(session_id).await?;
        self.require_active(&session)?;

        let removed = session.cart.remove_item(item_id).map_err(CoreError::from)?;
        session.recompute_totals(self.config().tax_rate());

        // Snapshot before release: a leaked hold lapses at expiry, a cart
        // line without a hold could oversell.
        if !self.db().sessions().update_snapshot(&session).await? {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }
        self.db().stock().release_for_sku(session_id, &removed.sku_id).await?;

        debug!(session_id, item_id, sku_id = %removed.sku_id, "Cart line removed");
        Ok(session)
    }

    /// Empties the cart and releases every hold the session carries.
    pub async fn clear_cart(&self, session_id: &str) -> EngineResult<Session> {
        let mut session = self.load_live(session_id).await?;
        self.require_active(&session)?;

        session.cart.clear();
        session.recompute_totals(self.config().tax_rate());

        if !self.db().sessions().update_snapshot(&session).await? {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }
        self.db().stock().release(session_id).await?;

        debug!(session_id, "Cart cleared");
        Ok(session)
    }
}

// =============================================================================
// Customer Operations
// =============================================================================

impl PosEngine {
    /// Sets or clears the session's customer draft. Drafts are stored
    /// unvalidated; validation happens on save.
    pub async fn set_customer_draft(
        &self,
        session_id: &str,
        draft: Option<CustomerInfo>,
    ) -> EngineResult<Session> {
        let mut session = self.load_live(session_id).await?;
        if session.status.is_terminal() {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        session.customer = draft.filter(|d| !d.is_empty());
        session.updated_at = Utc::now();
        if !self.db().sessions().update_snapshot(&session).await? {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }
        Ok(session)
    }

    /// Links an existing customer record to the session.
    pub async fn link_customer(&self, session_id: &str, customer_id: &str) -> EngineResult<Session> {
        let customer = self
            .db()
            .customers()
            .get(customer_id)
            .await?
            .ok_or_else(|| till_db::DbError::not_found("Customer", customer_id))?;

        let mut session = self.load_live(session_id).await?;
        if session.status.is_terminal() {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        session.customer_id = Some(customer.id.clone());
        session.customer = Some(CustomerInfo {
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
        });
        session.updated_at = Utc::now();
        if !self.db().sessions().update_snapshot(&session).await? {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }
        Ok(session)
    }

    /// Validates and persists the session's draft as a customer record,
    /// linking it back onto the session.
    pub async fn save_customer(&self, session_id: &str) -> EngineResult<Session> {
        let mut session = self.load_live(session_id).await?;
        if session.status.is_terminal() {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        let draft = session
            .customer
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or(CoreError::Validation(
                till_core::ValidationError::Required {
                    field: "customer".to_string(),
                },
            ))?;
        validation::validate_customer_draft(&draft).map_err(CoreError::from)?;

        let customer = self
            .db()
            .customers()
            .insert_from_draft(&session.store_id, &draft)
            .await?;

        session.customer_id = Some(customer.id.clone());
        session.updated_at = Utc::now();
        if !self.db().sessions().update_snapshot(&session).await? {
            return Err(self.wrong_status(session_id, SessionStatus::Active).await?);
        }

        info!(session_id, customer_id = %customer.id, "Customer saved and linked");
        Ok(session)
    }
}

// =============================================================================
// Catalog & Stock Surface
// =============================================================================

impl PosEngine {
    /// All active SKUs carrying a barcode: zero, one, or many (variants
    /// of one product may share a barcode; the cashier disambiguates).
    pub async fn lookup_barcode(&self, store_id: &str, barcode: &str) -> EngineResult<Vec<Product>> {
        Ok(self.db().products().lookup_by_barcode(store_id, barcode).await?)
    }

    /// Searches the catalog by name, SKU code, or barcode fragment.
    pub async fn search_products(
        &self,
        store_id: &str,
        query: &str,
        limit: i64,
    ) -> EngineResult<Vec<Product>> {
        Ok(self.db().products().search(store_id, query, limit).await?)
    }

    /// Searches the customer directory by name or phone fragment.
    pub async fn search_customers(
        &self,
        store_id: &str,
        query: &str,
        limit: i64,
    ) -> EngineResult<Vec<till_core::Customer>> {
        Ok(self.db().customers().search(store_id, query, limit).await?)
    }

    /// Sets the physical stock counter for a SKU (receiving/stocktake).
    /// Holds are untouched; a later commit may come up short.
    pub async fn set_physical_stock(&self, sku_id: &str, quantity: i64) -> EngineResult<()> {
        info!(sku_id, quantity, "Physical stock set");
        Ok(self.db().stock().set_physical(sku_id, quantity).await?)
    }

    /// Current physical/reserved/available position for a SKU.
    pub async fn stock_level(&self, sku_id: &str) -> EngineResult<StockLevel> {
        Ok(self.db().stock().level(sku_id).await?)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

impl PosEngine {
    /// Loads a session and applies lazy expiry. Mutating operations use
    /// this so nothing ever proceeds against a session past its deadline.
    pub(crate) async fn load_live(&self, id: &str) -> EngineResult<Session> {
        let session = self
            .db()
            .sessions()
            .get(id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;

        if session.is_expired_at(Utc::now()) {
            self.expire_now(&session).await?;
            return Err(CoreError::SessionExpired(id.to_string()).into());
        }
        Ok(session)
    }

    /// Releases holds and marks the session expired. Idempotent under
    /// races: the release is a no-op on repeat and the status update is
    /// guarded.
    pub(crate) async fn expire_now(&self, session: &Session) -> EngineResult<()> {
        warn!(session_id = %session.id, "Session expired, releasing holds");
        self.db().stock().release(&session.id).await?;
        self.db().sessions().expire(&session.id).await?;
        Ok(())
    }

    /// Rejects any status other than Active. Completed gets its own
    /// error so terminals can treat a double-finalize as benign.
    pub(crate) fn require_active(&self, session: &Session) -> EngineResult<()> {
        match session.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Completed => {
                Err(CoreError::AlreadyCompleted(session.id.clone()).into())
            }
            other => Err(CoreError::InvalidSessionStatus {
                session_id: session.id.clone(),
                current: other.to_string(),
                expected: SessionStatus::Active.to_string(),
            }
            .into()),
        }
    }

    /// Builds the status error for a guarded UPDATE that matched no rows:
    /// re-reads the session so the error names the status it actually has.
    pub(crate) async fn wrong_status(
        &self,
        id: &str,
        expected: SessionStatus,
    ) -> EngineResult<crate::EngineError> {
        let current = match self.db().sessions().get(id).await? {
            Some(s) if s.status == SessionStatus::Completed => {
                return Ok(CoreError::AlreadyCompleted(id.to_string()).into());
            }
            Some(s) => s.status.to_string(),
            None => return Ok(CoreError::SessionNotFound(id.to_string()).into()),
        };
        Ok(CoreError::InvalidSessionStatus {
            session_id: id.to_string(),
            current,
            expected: expected.to_string(),
        }
        .into())
    }

    /// Reloads a session that is known to exist.
    pub(crate) async fn reload(&self, id: &str) -> EngineResult<Session> {
        self.db()
            .sessions()
            .get(id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
            .map_err(Into::into)
    }
}
