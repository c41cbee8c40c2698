//! # Stock Repository: the Inventory Hold Ledger
//!
//! Tracks, per SKU, how much quantity is provisionally reserved by live
//! sessions versus physically available.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Inventory Hold Ledger                               │
//! │                                                                         │
//! │  stock_levels                 inventory_holds                           │
//! │  ┌──────────┬──────────┐      ┌───────────┬──────────┬──────────┐       │
//! │  │ sku_id   │ physical │      │ session   │ sku_id   │ quantity │       │
//! │  ├──────────┼──────────┤      ├───────────┼──────────┼──────────┤       │
//! │  │ WIG-001  │    3     │      │ sess-A    │ WIG-001  │    2     │       │
//! │  └──────────┴──────────┘      │ sess-B    │ WIG-001  │    1     │       │
//! │                               └───────────┴──────────┴──────────┘       │
//! │                                                                         │
//! │  available(sku) = physical(sku) − Σ holds(sku)                          │
//! │  INVARIANT: Σ holds(sku) ≤ physical(sku), at all times                  │
//! │                                                                         │
//! │  reserve/adjust embed the availability check in ONE statement, so       │
//! │  SQLite's single-writer lock serializes racing registers: the last      │
//! │  unit gets exactly one winner and one InsufficientStock.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics
//! Insufficiency is an *outcome*, not a `DbError`: callers must branch on
//! it and re-prompt the cashier with current availability. It is never
//! retried automatically.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

// =============================================================================
// Outcome Types
// =============================================================================

/// Result of a reserve/adjust attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Hold recorded.
    Reserved,
    /// Not enough unreserved stock; nothing was recorded.
    Insufficient { available: i64 },
}

impl ReserveOutcome {
    #[inline]
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved)
    }
}

/// A line that could not be covered at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortLine {
    pub sku_id: String,
    pub available: i64,
    pub requested: i64,
}

/// Result of committing a session's holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All holds converted to permanent decrements.
    Committed,
    /// Stock changed between hold and commit; nothing was decremented.
    Short(Vec<ShortLine>),
}

/// Read model for one SKU's stock position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub sku_id: String,
    pub physical_qty: i64,
    pub reserved_qty: i64,
    pub available_qty: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the inventory hold ledger.
///
/// The only writer of physical stock counters in the system.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Physical baseline
    // -------------------------------------------------------------------------

    /// Sets the physical stock counter for a SKU (receiving/stocktake).
    pub async fn set_physical(&self, sku_id: &str, quantity: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO stock_levels (sku_id, physical_qty, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (sku_id) DO UPDATE SET physical_qty = ?2, updated_at = ?3
            "#,
        )
        .bind(sku_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Current stock position for a SKU.
    pub async fn level(&self, sku_id: &str) -> DbResult<StockLevel> {
        let physical: i64 = sqlx::query_scalar(
            "SELECT COALESCE((SELECT physical_qty FROM stock_levels WHERE sku_id = ?1), 0)",
        )
        .bind(sku_id)
        .fetch_one(&self.pool)
        .await?;

        let reserved: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_holds WHERE sku_id = ?1",
        )
        .bind(sku_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StockLevel {
            sku_id: sku_id.to_string(),
            physical_qty: physical,
            reserved_qty: reserved,
            available_qty: physical - reserved,
        })
    }

    /// The session's current hold on a SKU (0 if none).
    pub async fn hold_quantity(&self, session_id: &str, sku_id: &str) -> DbResult<i64> {
        let qty: i64 = sqlx::query_scalar(
            "SELECT COALESCE((SELECT quantity FROM inventory_holds \
             WHERE session_id = ?1 AND sku_id = ?2), 0)",
        )
        .bind(session_id)
        .bind(sku_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(qty)
    }

    /// All holds carried by a session, as (sku_id, quantity) pairs.
    pub async fn holds_for_session(&self, session_id: &str) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sku_id, quantity FROM inventory_holds WHERE session_id = ?1 ORDER BY sku_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Reserve / adjust
    // -------------------------------------------------------------------------

    /// Atomically reserves `quantity` more units of a SKU for a session.
    ///
    /// The availability check and the hold upsert are one SQL statement,
    /// which SQLite executes under its writer lock; two registers racing
    /// for the last unit produce exactly one `Reserved`.
    pub async fn reserve(
        &self,
        sku_id: &str,
        session_id: &str,
        quantity: i64,
    ) -> DbResult<ReserveOutcome> {
        debug!(sku_id, session_id, quantity, "Reserving stock");
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO inventory_holds (session_id, sku_id, quantity, created_at, updated_at)
            SELECT ?1, ?2, ?3, ?4, ?4
            WHERE COALESCE((SELECT physical_qty FROM stock_levels WHERE sku_id = ?2), 0)
                  - COALESCE((SELECT SUM(quantity) FROM inventory_holds WHERE sku_id = ?2), 0)
                  >= ?3
            ON CONFLICT (session_id, sku_id)
                DO UPDATE SET quantity = quantity + ?3, updated_at = ?4
            "#,
        )
        .bind(session_id)
        .bind(sku_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let level = self.level(sku_id).await?;
            return Ok(ReserveOutcome::Insufficient {
                available: level.available_qty,
            });
        }
        Ok(ReserveOutcome::Reserved)
    }

    /// Sets a session's hold on a SKU to `new_quantity`, checking
    /// availability for the increase only. `new_quantity <= 0` releases
    /// the hold. Never silently truncates.
    pub async fn adjust(
        &self,
        sku_id: &str,
        session_id: &str,
        new_quantity: i64,
    ) -> DbResult<ReserveOutcome> {
        if new_quantity <= 0 {
            self.release_for_sku(session_id, sku_id).await?;
            return Ok(ReserveOutcome::Reserved);
        }

        debug!(sku_id, session_id, new_quantity, "Adjusting hold");
        let now = Utc::now();

        // Reductions always pass; increases re-check the delta against
        // what is still unreserved. Subqueries see pre-update state.
        let result = sqlx::query(
            r#"
            UPDATE inventory_holds SET quantity = ?3, updated_at = ?4
            WHERE session_id = ?1 AND sku_id = ?2
              AND ( ?3 <= quantity
                 OR COALESCE((SELECT physical_qty FROM stock_levels WHERE sku_id = ?2), 0)
                    - COALESCE((SELECT SUM(quantity) FROM inventory_holds WHERE sku_id = ?2), 0)
                    >= ?3 - quantity )
            "#,
        )
        .bind(session_id)
        .bind(sku_id)
        .bind(new_quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ReserveOutcome::Reserved);
        }

        // No hold row yet (fresh line, or hold lapsed on expiry): behave
        // as a reserve of the full quantity. Otherwise it was a rejected
        // increase.
        if self.hold_quantity(session_id, sku_id).await? == 0 {
            return self.reserve(sku_id, session_id, new_quantity).await;
        }

        let level = self.level(sku_id).await?;
        Ok(ReserveOutcome::Insufficient {
            available: level.available_qty,
        })
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Releases all holds for a session. Idempotent: releasing an
    /// already-released hold is a no-op, not an error.
    pub async fn release(&self, session_id: &str) -> DbResult<()> {
        debug!(session_id, "Releasing all holds");
        sqlx::query("DELETE FROM inventory_holds WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Releases a session's hold on one SKU. Idempotent.
    pub async fn release_for_sku(&self, session_id: &str, sku_id: &str) -> DbResult<()> {
        debug!(session_id, sku_id, "Releasing hold");
        sqlx::query("DELETE FROM inventory_holds WHERE session_id = ?1 AND sku_id = ?2")
            .bind(session_id)
            .bind(sku_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Converts all of a session's holds into permanent stock decrements.
    ///
    /// All-or-nothing: each decrement is guarded by `physical_qty >= held`
    /// inside one transaction; if any SKU comes up short the transaction
    /// rolls back and the short lines are reported. Callable only behind
    /// the session's `completing` guard, which makes it once-per-session.
    pub async fn commit(&self, session_id: &str) -> DbResult<CommitOutcome> {
        let holds = self.holds_for_session(session_id).await?;
        if holds.is_empty() {
            // Nothing held: nothing to decrement (cart emptiness is the
            // finalizer's concern, not the ledger's).
            return Ok(CommitOutcome::Committed);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut short = Vec::new();

        for (sku_id, quantity) in &holds {
            let result = sqlx::query(
                r#"
                UPDATE stock_levels SET physical_qty = physical_qty - ?2, updated_at = ?3
                WHERE sku_id = ?1 AND physical_qty >= ?2
                "#,
            )
            .bind(sku_id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let physical: i64 = sqlx::query_scalar(
                    "SELECT COALESCE((SELECT physical_qty FROM stock_levels WHERE sku_id = ?1), 0)",
                )
                .bind(sku_id)
                .fetch_one(&mut *tx)
                .await?;
                short.push(ShortLine {
                    sku_id: sku_id.clone(),
                    available: physical,
                    requested: *quantity,
                });
            }
        }

        if !short.is_empty() {
            tx.rollback().await?;
            return Ok(CommitOutcome::Short(short));
        }

        sqlx::query("DELETE FROM inventory_holds WHERE session_id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(session_id, lines = holds.len(), "Holds committed to stock");
        Ok(CommitOutcome::Committed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn repo() -> StockRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().stock()
    }

    #[tokio::test]
    async fn test_reserve_within_stock() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();

        let outcome = stock.reserve("wig-001", "sess-a", 2).await.unwrap();
        assert!(outcome.is_reserved());

        let level = stock.level("wig-001").await.unwrap();
        assert_eq!(level.physical_qty, 3);
        assert_eq!(level.reserved_qty, 2);
        assert_eq!(level.available_qty, 1);
    }

    #[tokio::test]
    async fn test_reserve_rejects_oversell_across_sessions() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();

        assert!(stock.reserve("wig-001", "sess-a", 2).await.unwrap().is_reserved());

        // Second terminal wants 2 more; only 1 left.
        let outcome = stock.reserve("wig-001", "sess-b", 2).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 1 });

        // Nothing was recorded for the loser.
        let level = stock.level("wig-001").await.unwrap();
        assert_eq!(level.reserved_qty, 2);
        assert_eq!(stock.hold_quantity("sess-b", "wig-001").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reserve_merges_into_existing_hold() {
        let stock = repo().await;
        stock.set_physical("wig-001", 5).await.unwrap();

        stock.reserve("wig-001", "sess-a", 2).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();

        assert_eq!(stock.hold_quantity("sess-a", "wig-001").await.unwrap(), 4);
        assert_eq!(stock.level("wig-001").await.unwrap().available_qty, 1);
    }

    #[tokio::test]
    async fn test_reserve_unknown_sku_has_zero_stock() {
        let stock = repo().await;
        let outcome = stock.reserve("ghost", "sess-a", 1).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 0 });
    }

    #[tokio::test]
    async fn test_adjust_checks_delta_only() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();
        stock.reserve("wig-001", "sess-b", 1).await.unwrap();

        // 2 → 1 always passes.
        assert!(stock.adjust("wig-001", "sess-a", 1).await.unwrap().is_reserved());
        // 1 → 2 passes: one unit free after the reduction.
        assert!(stock.adjust("wig-001", "sess-a", 2).await.unwrap().is_reserved());
        // 2 → 3 fails: sess-b still holds the third unit.
        let outcome = stock.adjust("wig-001", "sess-a", 3).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 0 });
        // Failed adjust didn't truncate the hold.
        assert_eq!(stock.hold_quantity("sess-a", "wig-001").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_adjust_to_zero_releases() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();

        stock.adjust("wig-001", "sess-a", 0).await.unwrap();
        assert_eq!(stock.level("wig-001").await.unwrap().reserved_qty, 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();

        stock.release("sess-a").await.unwrap();
        stock.release("sess-a").await.unwrap(); // no-op, not an error

        // Back to the pre-reservation baseline.
        let level = stock.level("wig-001").await.unwrap();
        assert_eq!(level.reserved_qty, 0);
        assert_eq!(level.physical_qty, 3);
    }

    #[tokio::test]
    async fn test_commit_decrements_and_clears_holds() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();
        stock.set_physical("comb-002", 10).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();
        stock.reserve("comb-002", "sess-a", 1).await.unwrap();

        let outcome = stock.commit("sess-a").await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        assert_eq!(stock.level("wig-001").await.unwrap().physical_qty, 1);
        assert_eq!(stock.level("comb-002").await.unwrap().physical_qty, 9);
        assert!(stock.holds_for_session("sess-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_short_rolls_back_everything() {
        let stock = repo().await;
        stock.set_physical("wig-001", 3).await.unwrap();
        stock.set_physical("comb-002", 10).await.unwrap();
        stock.reserve("wig-001", "sess-a", 2).await.unwrap();
        stock.reserve("comb-002", "sess-a", 1).await.unwrap();

        // Stock vanished out from under the hold (stocktake correction).
        stock.set_physical("wig-001", 1).await.unwrap();

        let outcome = stock.commit("sess-a").await.unwrap();
        match outcome {
            CommitOutcome::Short(lines) => {
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].sku_id, "wig-001");
                assert_eq!(lines[0].available, 1);
                assert_eq!(lines[0].requested, 2);
            }
            CommitOutcome::Committed => panic!("commit should have come up short"),
        }

        // Nothing was decremented, holds intact.
        assert_eq!(stock.level("comb-002").await.unwrap().physical_qty, 10);
        assert_eq!(stock.hold_quantity("sess-a", "comb-002").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invariant_reserved_never_exceeds_physical() {
        let stock = repo().await;
        stock.set_physical("wig-001", 4).await.unwrap();

        // Interleave a mix of operations from three sessions.
        stock.reserve("wig-001", "s1", 2).await.unwrap();
        stock.reserve("wig-001", "s2", 2).await.unwrap();
        let _ = stock.reserve("wig-001", "s3", 1).await.unwrap();
        let _ = stock.adjust("wig-001", "s1", 3).await.unwrap();
        stock.adjust("wig-001", "s2", 1).await.unwrap();
        let _ = stock.reserve("wig-001", "s3", 1).await.unwrap();

        let level = stock.level("wig-001").await.unwrap();
        assert!(level.reserved_qty <= level.physical_qty);
    }
}
