//! # Terminal Store
//!
//! Per-register state machine over the engine. Keeps the last
//! server-confirmed session snapshot, applies mutations optimistically
//! for the UI, and rolls back whenever the engine rejects.
//!
//! ## Lock Discipline
//! State lives behind a std `Mutex` and is only touched through
//! [`TerminalStore::with_state`]/[`with_state_mut`], which cannot hold
//! the guard across an `.await`.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use till_core::{CoreError, CustomerInfo, PaymentMethod, Product, Session};
use till_engine::{CompletedSale, EngineError, EngineResult, PosEngine, ResumeOutcome};

use crate::lookup::LookupGate;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Default)]
struct TerminalState {
    /// Last server-confirmed session, if one is attached.
    session: Option<Session>,
    /// Customer fields as the cashier types them, not yet pushed.
    customer_draft: CustomerInfo,
    /// Whether the scanner input mode is engaged.
    scanning: bool,
    /// Current product search text.
    search_query: String,
    /// The previous sale, kept for receipt display after reset.
    last_sale: Option<CompletedSale>,
}

/// A point-in-time copy of the terminal state for the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSnapshot {
    pub session: Option<Session>,
    pub customer_draft: CustomerInfo,
    pub scanning: bool,
    pub search_query: String,
    pub last_sale: Option<CompletedSale>,
}

/// What a barcode scan resolved to.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// No active SKU carries this barcode; fall back to search.
    Unknown,
    /// Exactly one SKU matched and was added to the cart.
    Added(Session),
    /// Several variants share the barcode; the cashier picks one.
    Ambiguous(Vec<Product>),
    /// A newer scan started while this one was in flight; the result
    /// was discarded without touching the cart.
    Superseded,
}

// =============================================================================
// Store
// =============================================================================

/// Register-side session store. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct TerminalStore {
    engine: PosEngine,
    store_id: String,
    register_number: String,
    state: Arc<Mutex<TerminalState>>,
    lookup: Arc<LookupGate>,
}

impl TerminalStore {
    /// Creates a store for one register. Nothing is attached yet.
    pub fn new(engine: PosEngine, store_id: &str, register_number: &str) -> Self {
        TerminalStore {
            engine,
            store_id: store_id.to_string(),
            register_number: register_number.to_string(),
            state: Arc::new(Mutex::new(TerminalState::default())),
            lookup: Arc::new(LookupGate::new()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&TerminalState) -> T) -> T {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut TerminalState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The attached session, as last confirmed by the engine.
    pub fn session(&self) -> Option<Session> {
        self.with_state(|s| s.session.clone())
    }

    /// Full state snapshot for the UI.
    pub fn snapshot(&self) -> TerminalSnapshot {
        self.with_state(|s| TerminalSnapshot {
            session: s.session.clone(),
            customer_draft: s.customer_draft.clone(),
            scanning: s.scanning,
            search_query: s.search_query.clone(),
            last_sale: s.last_sale.clone(),
        })
    }

    fn attached_id(&self) -> EngineResult<String> {
        self.with_state(|s| s.session.as_ref().map(|session| session.id.clone()))
            .ok_or_else(|| {
                CoreError::SessionNotFound(format!(
                    "no session attached to register {}",
                    self.register_number
                ))
                .into()
            })
    }

    fn confirm(&self, session: Session) {
        self.with_state_mut(|s| s.session = Some(session));
    }

    fn restore(&self, session: Option<Session>) {
        self.with_state_mut(|s| s.session = session);
    }

    /// Drops the cached session when the engine reveals it is gone
    /// (expired, completed elsewhere, raced terminal).
    fn detach_if_gone(&self, err: EngineError) -> EngineError {
        if matches!(
            err,
            EngineError::Core(CoreError::SessionExpired(_))
                | EngineError::Core(CoreError::AlreadyCompleted(_))
                | EngineError::Core(CoreError::InvalidSessionStatus { .. })
        ) {
            warn!(register = %self.register_number, "Attached session is gone, detaching");
            self.with_state_mut(|s| s.session = None);
        }
        err
    }
}

// =============================================================================
// Attach & Lifecycle
// =============================================================================

impl TerminalStore {
    /// Attaches to the register's active session, creating one if the
    /// register is idle. Losing the creation race to another terminal
    /// attaches to the winner's session.
    pub async fn attach(&self, cashier_id: Option<&str>) -> EngineResult<Session> {
        if let Some(existing) = self
            .engine
            .active_session(&self.store_id, &self.register_number)
            .await?
        {
            info!(session_id = %existing.id, register = %self.register_number, "Attached to existing session");
            self.confirm(existing.clone());
            return Ok(existing);
        }

        match self
            .engine
            .create_session(&self.store_id, &self.register_number, cashier_id)
            .await
        {
            Ok(session) => {
                info!(session_id = %session.id, register = %self.register_number, "Created fresh session");
                self.confirm(session.clone());
                Ok(session)
            }
            Err(EngineError::Core(CoreError::DuplicateActiveSession { .. })) => {
                let session = self
                    .engine
                    .active_session(&self.store_id, &self.register_number)
                    .await?
                    .ok_or_else(|| {
                        CoreError::SessionNotFound(format!(
                            "register {} active session vanished",
                            self.register_number
                        ))
                    })?;
                self.confirm(session.clone());
                Ok(session)
            }
            Err(e) => Err(e),
        }
    }

    /// Pauses the attached sale and frees the register.
    pub async fn hold(&self, reason: Option<&str>) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let held = self
            .engine
            .hold_session(&session_id, reason)
            .await
            .map_err(|e| self.detach_if_gone(e))?;
        self.with_state_mut(|s| s.session = None);
        Ok(held)
    }

    /// Resumes a held session onto this register and attaches it.
    /// Lapsed lines come back for the cashier to resolve.
    ///
    /// A session whose deadline passed while it sat held cannot come
    /// back; the customer starts over on a fresh session instead of the
    /// cashier seeing a hard failure.
    pub async fn resume(&self, session_id: &str) -> EngineResult<ResumeOutcome> {
        match self.engine.resume_session(session_id).await {
            Ok(outcome) => {
                self.confirm(outcome.session.clone());
                Ok(outcome)
            }
            Err(EngineError::Core(CoreError::SessionExpired(_))) => {
                warn!(session_id, "Held session expired, starting fresh");
                let session = self.attach(None).await?;
                Ok(ResumeOutcome {
                    session,
                    lapsed: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels the attached sale.
    pub async fn void(&self, reason: &str) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let voided = self
            .engine
            .void_session(&session_id, reason)
            .await
            .map_err(|e| self.detach_if_gone(e))?;
        self.lookup.invalidate();
        self.with_state_mut(|s| {
            s.session = None;
            s.customer_draft = CustomerInfo::default();
        });
        Ok(voided)
    }

    /// Finalizes the attached sale, stores the receipt, and resets the
    /// terminal for the next customer.
    pub async fn complete(&self, payment_method: PaymentMethod) -> EngineResult<CompletedSale> {
        let session_id = self.attached_id()?;
        let sale = self
            .engine
            .complete_transaction(&session_id, payment_method)
            .await
            .map_err(|e| self.detach_if_gone(e))?;

        self.lookup.invalidate();
        self.with_state_mut(|s| {
            s.session = None;
            s.customer_draft = CustomerInfo::default();
            s.search_query.clear();
            s.scanning = false;
            s.last_sale = Some(sale.clone());
        });
        Ok(sale)
    }
}

// =============================================================================
// Cart Mutations (optimistic)
// =============================================================================

impl TerminalStore {
    /// Resolves a barcode scan: unknown, auto-added, ambiguous, or
    /// superseded. Each scan supersedes the ones before it; a result
    /// overtaken by a newer scan is dropped before it can touch the cart.
    pub async fn scan(&self, barcode: &str) -> EngineResult<ScanOutcome> {
        let token = self.lookup.begin();
        self.resolve_scan(barcode, token).await
    }

    async fn resolve_scan(&self, barcode: &str, token: u64) -> EngineResult<ScanOutcome> {
        let matches = self.engine.lookup_barcode(&self.store_id, barcode).await?;
        if !self.lookup.accepts(token) {
            debug!(barcode, "Scan overtaken by a newer lookup, dropping result");
            return Ok(ScanOutcome::Superseded);
        }
        match matches.as_slice() {
            [] => {
                debug!(barcode, "Unknown barcode");
                Ok(ScanOutcome::Unknown)
            }
            [only] => {
                let sku_id = only.id.clone();
                let session = self.add_item(&sku_id, 1).await?;
                Ok(ScanOutcome::Added(session))
            }
            _ => Ok(ScanOutcome::Ambiguous(matches)),
        }
    }

    /// Adds a SKU to the cart. Server-confirmed: the snapshot is not
    /// guessed at because the product data lives on the engine side.
    pub async fn add_item(&self, sku_id: &str, quantity: i64) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let session = self
            .engine
            .add_to_cart(&session_id, sku_id, quantity)
            .await
            .map_err(|e| self.detach_if_gone(e))?;
        self.confirm(session.clone());
        Ok(session)
    }

    /// Sets a line's quantity, optimistically: the cached cart changes
    /// immediately and rolls back if the engine rejects.
    pub async fn update_quantity(&self, item_id: &str, quantity: i64) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let rate = self.engine.config().tax_rate();

        let rollback = self.with_state_mut(|s| {
            let rollback = s.session.clone();
            if let Some(session) = s.session.as_mut() {
                if session.cart.update_quantity(item_id, quantity).is_ok() {
                    session.recompute_totals(rate);
                }
            }
            rollback
        });

        match self
            .engine
            .update_cart_quantity(&session_id, item_id, quantity)
            .await
        {
            Ok(session) => {
                self.confirm(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.restore(rollback);
                Err(self.detach_if_gone(err))
            }
        }
    }

    /// Removes a line, optimistically.
    pub async fn remove_item(&self, item_id: &str) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let rate = self.engine.config().tax_rate();

        let rollback = self.with_state_mut(|s| {
            let rollback = s.session.clone();
            if let Some(session) = s.session.as_mut() {
                if session.cart.remove_item(item_id).is_ok() {
                    session.recompute_totals(rate);
                }
            }
            rollback
        });

        match self.engine.remove_from_cart(&session_id, item_id).await {
            Ok(session) => {
                self.confirm(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.restore(rollback);
                Err(self.detach_if_gone(err))
            }
        }
    }

    /// Empties the cart, optimistically.
    pub async fn clear_cart(&self) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let rate = self.engine.config().tax_rate();

        let rollback = self.with_state_mut(|s| {
            let rollback = s.session.clone();
            if let Some(session) = s.session.as_mut() {
                session.cart.clear();
                session.recompute_totals(rate);
            }
            rollback
        });

        match self.engine.clear_cart(&session_id).await {
            Ok(session) => {
                self.confirm(session.clone());
                Ok(session)
            }
            Err(err) => {
                self.restore(rollback);
                Err(self.detach_if_gone(err))
            }
        }
    }
}

// =============================================================================
// Customer & UI State
// =============================================================================

impl TerminalStore {
    /// Updates the local draft as the cashier types. Nothing is sent.
    pub fn edit_customer_draft(&self, draft: CustomerInfo) {
        self.with_state_mut(|s| s.customer_draft = draft);
    }

    /// The draft currently being edited.
    pub fn customer_draft(&self) -> CustomerInfo {
        self.with_state(|s| s.customer_draft.clone())
    }

    /// Pushes the local draft onto the session so it survives
    /// hold/resume and terminal restarts.
    pub async fn push_customer_draft(&self) -> EngineResult<Session> {
        let session_id = self.attached_id()?;
        let draft = self.customer_draft();
        let draft = if draft.is_empty() { None } else { Some(draft) };
        let session = self
            .engine
            .set_customer_draft(&session_id, draft)
            .await
            .map_err(|e| self.detach_if_gone(e))?;
        self.confirm(session.clone());
        Ok(session)
    }

    /// Validates and persists the draft as a customer record, linked to
    /// the session.
    pub async fn save_customer(&self) -> EngineResult<Session> {
        self.push_customer_draft().await?;
        let session_id = self.attached_id()?;
        let session = self
            .engine
            .save_customer(&session_id)
            .await
            .map_err(|e| self.detach_if_gone(e))?;
        self.confirm(session.clone());
        Ok(session)
    }

    /// Toggles scanner input mode.
    pub fn set_scanning(&self, scanning: bool) {
        self.with_state_mut(|s| s.scanning = scanning);
    }

    /// Sets the product search text.
    pub fn set_search_query(&self, query: &str) {
        self.with_state_mut(|s| s.search_query = query.to_string());
    }

    /// Runs the current search text against the catalog. Returns `None`
    /// when a newer scan or search superseded this one while the query
    /// was in flight.
    pub async fn search_products(&self, limit: i64) -> EngineResult<Option<Vec<Product>>> {
        let token = self.lookup.begin();
        self.run_search(limit, token).await
    }

    async fn run_search(&self, limit: i64, token: u64) -> EngineResult<Option<Vec<Product>>> {
        let query = self.with_state(|s| s.search_query.clone());
        let products = self
            .engine
            .search_products(&self.store_id, &query, limit)
            .await?;
        if !self.lookup.accepts(token) {
            debug!(query = %query, "Search overtaken by a newer lookup, dropping result");
            return Ok(None);
        }
        Ok(Some(products))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
