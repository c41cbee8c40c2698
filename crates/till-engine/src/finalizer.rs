//! # Transaction Finalizer
//!
//! Converts an active session into an immutable transaction record,
//! exactly once.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Completion Pipeline                                │
//! │                                                                         │
//! │  complete_transaction(session_id, payment_method)                       │
//! │       │                                                                 │
//! │       ├── 1. load live (expired sessions never finalize)                │
//! │       ├── 2. status Active?     Completed → AlreadyCompleted            │
//! │       ├── 3. cart non-empty?                                            │
//! │       ├── 4. claim `completing` guard ── at most ONE caller wins        │
//! │       ├── 5. ledger commit: holds → permanent decrements                │
//! │       │       └── Short → guard released, CommitShort, nothing written  │
//! │       ├── 6. write transaction + frozen item snapshots                  │
//! │       └── 7. session → completed                                        │
//! │                                                                         │
//! │  A second caller at ANY point gets AlreadyCompleted; the original       │
//! │  transaction stands untouched.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use till_core::{CoreError, PaymentMethod, Session, Transaction, TransactionItem};
use till_db::CommitOutcome;

use crate::error::{EngineError, EngineResult};
use crate::PosEngine;

/// How many transaction-number collisions to tolerate before giving up.
/// Collisions require two finalizers on the same register in the same
/// instant, so one retry is already rare.
const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// A finalized sale: the immutable record plus its frozen lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSale {
    pub transaction: Transaction,
    pub items: Vec<TransactionItem>,
}

impl PosEngine {
    /// Finalizes an active session into a transaction.
    ///
    /// ## Errors
    /// - `AlreadyCompleted`: the session was finalized before (or a
    ///   finalize is in flight); the original record stands
    /// - `EmptyCart`: nothing to sell
    /// - `CommitShort`: physical stock no longer covers the holds;
    ///   nothing was written and the cashier corrects the cart
    pub async fn complete_transaction(
        &self,
        session_id: &str,
        payment_method: PaymentMethod,
    ) -> EngineResult<CompletedSale> {
        let session = self.load_live(session_id).await?;
        self.require_active(&session)?;

        if session.cart.is_empty() {
            return Err(CoreError::EmptyCart(session_id.to_string()).into());
        }

        // The guard is the idempotency point: everything below happens at
        // most once per session, no matter how many terminals retry.
        if !self.db().sessions().claim_completing(session_id).await? {
            return Err(CoreError::AlreadyCompleted(session_id.to_string()).into());
        }

        match self.db().stock().commit(session_id).await? {
            CommitOutcome::Committed => {}
            CommitOutcome::Short(lines) => {
                warn!(
                    session_id,
                    short_lines = lines.len(),
                    "Ledger commit came up short, finalize aborted"
                );
                self.db().sessions().clear_completing(session_id).await?;
                return Err(EngineError::CommitShort(lines));
            }
        }

        // Stock is decremented from here on. A failure below leaves the
        // guard claimed on purpose: the mismatch needs an operator, not a
        // blind retry that would decrement twice.
        let completed_at = Utc::now();
        let (transaction, items) = self
            .write_transaction(&session, payment_method, completed_at)
            .await?;

        if !self.db().sessions().complete(session_id, completed_at).await? {
            error!(session_id, "Completion status update matched no rows");
            return Err(till_db::DbError::Internal(format!(
                "session {session_id} vanished during completion"
            ))
            .into());
        }

        info!(
            session_id,
            transaction_number = %transaction.transaction_number,
            total_cents = transaction.total_cents,
            "Transaction completed"
        );
        Ok(CompletedSale { transaction, items })
    }

    /// Builds and inserts the transaction record, retrying the number on
    /// the (rare) same-instant collision.
    async fn write_transaction(
        &self,
        session: &Session,
        payment_method: PaymentMethod,
        completed_at: chrono::DateTime<Utc>,
    ) -> EngineResult<(Transaction, Vec<TransactionItem>)> {
        let customer_name = self.frozen_customer_name(session).await?;

        let transaction_id = Uuid::new_v4().to_string();
        let items: Vec<TransactionItem> = session
            .cart
            .items
            .iter()
            .map(|line| TransactionItem {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                product_id: line.product_id.clone(),
                sku_id: line.sku_id.clone(),
                sku_code_snapshot: line.sku_code.clone(),
                name_snapshot: line.name.clone(),
                unit_price_cents: line.unit_price_cents,
                quantity: line.quantity,
                line_total_cents: line.line_total_cents(),
            })
            .collect();

        let prefix = format!(
            "{}-{}-",
            completed_at.format("%Y%m%d"),
            session.register_number
        );

        let mut sequence = self.db().transactions().count_with_prefix(&prefix).await? + 1;
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let transaction = Transaction {
                id: transaction_id.clone(),
                transaction_number: format!("{prefix}{sequence:04}"),
                session_id: session.id.clone(),
                store_id: session.store_id.clone(),
                register_number: session.register_number.clone(),
                cashier_id: session.cashier_id.clone(),
                customer_id: session.customer_id.clone(),
                customer_name: customer_name.clone(),
                payment_method,
                subtotal_cents: session.subtotal_cents,
                tax_cents: session.tax_cents,
                total_cents: session.total_cents,
                completed_at,
            };

            match self.db().transactions().insert(&transaction, &items).await {
                Ok(()) => return Ok((transaction, items)),
                Err(e) if e.is_unique_violation() && attempt + 1 < MAX_NUMBER_ATTEMPTS => {
                    warn!(
                        number = %transaction.transaction_number,
                        "Transaction number collision, retrying"
                    );
                    sequence += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop returns on success or final error")
    }

    /// The customer name frozen onto the record: the linked customer's
    /// saved name wins over the session draft.
    async fn frozen_customer_name(&self, session: &Session) -> EngineResult<Option<String>> {
        if let Some(customer_id) = &session.customer_id {
            if let Some(customer) = self.db().customers().get(customer_id).await? {
                return Ok(Some(customer.name));
            }
        }
        Ok(session
            .customer
            .as_ref()
            .map(|d| d.name.trim().to_string())
            .filter(|n| !n.is_empty()))
    }
}

// =============================================================================
// Receipt Lookup
// =============================================================================

impl PosEngine {
    /// The transaction that finalized a session, if any.
    pub async fn transaction_for_session(
        &self,
        session_id: &str,
    ) -> EngineResult<Option<CompletedSale>> {
        match self.db().transactions().get_by_session(session_id).await? {
            Some(transaction) => {
                let items = self.db().transactions().get_items(&transaction.id).await?;
                Ok(Some(CompletedSale { transaction, items }))
            }
            None => Ok(None),
        }
    }

    /// Replays a receipt by its human-legible number.
    pub async fn transaction_by_number(&self, number: &str) -> EngineResult<Option<CompletedSale>> {
        match self.db().transactions().get_by_number(number).await? {
            Some(transaction) => {
                let items = self.db().transactions().get_items(&transaction.id).await?;
                Ok(Some(CompletedSale { transaction, items }))
            }
            None => Ok(None),
        }
    }
}
