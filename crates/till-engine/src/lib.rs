//! # till-engine: Server-Side Session & Ledger Orchestration
//!
//! The surface every register talks to. Composes the pure cart engine
//! (till-core) with persistence (till-db) into the operations of a
//! point-of-sale session:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Control Flow                              │
//! │                                                                         │
//! │  Terminal action                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PosEngine (this crate)                                                 │
//! │   ├── lifecycle: create / get-active / hold / resume / void / update    │
//! │   ├── cart ops: add / update-qty / remove / clear                       │
//! │   │      └── hold ledger FIRST, cart mutation second, persist third     │
//! │   │          (a rejected reserve leaves the session untouched)          │
//! │   └── finalizer: complete_transaction                                   │
//! │          └── claim guard → commit holds → write immutable record        │
//! │                                                                         │
//! │  Every read path applies lazy expiry before trusting a status.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod finalizer;
pub mod lifecycle;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use finalizer::CompletedSale;
pub use lifecycle::{LapsedLine, ResumeOutcome};

use till_db::Database;

/// The server-side engine shared by all registers of a store installation.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct PosEngine {
    db: Database,
    config: EngineConfig,
}

impl PosEngine {
    /// Creates an engine over an initialized database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        PosEngine { db, config }
    }

    /// The engine's database handle.
    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
