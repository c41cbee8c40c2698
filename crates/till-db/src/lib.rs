//! # till-db: Database Layer for Till POS
//!
//! SQLite persistence for sessions, the inventory hold ledger, immutable
//! transactions, and the catalog/customer read sides.
//!
//! ## Responsibility Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          till-db                                        │
//! │                                                                         │
//! │  ✅ RESPONSIBILITIES                   ❌ NOT RESPONSIBLE FOR            │
//! │  ──────────────────────                ─────────────────────────        │
//! │  • Connection pool management          • Business logic (till-core)     │
//! │  • SQL execution + transactions        • Lifecycle rules (till-engine)  │
//! │  • Schema migrations                   • Terminal state (till-terminal) │
//! │  • Repository implementations          • Receipt/UI formatting          │
//! │  • The two hard constraints:                                            │
//! │      one active session per register                                    │
//! │      Σ holds(sku) ≤ physical(sku)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::customer::CustomerRepository;
pub use repository::product::ProductRepository;
pub use repository::session::SessionRepository;
pub use repository::stock::{CommitOutcome, ReserveOutcome, ShortLine, StockLevel, StockRepository};
pub use repository::transaction::TransactionRepository;
