//! # till-terminal: Register-Side Session State
//!
//! What a single register keeps between calls to the engine:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Terminal State Model                               │
//! │                                                                         │
//! │  TerminalStore (one per register)                                       │
//! │   ├── attached session        last server-confirmed snapshot            │
//! │   ├── customer draft          what the cashier is typing                │
//! │   ├── UI flags                scanning, search query                    │
//! │   └── last completed sale     for receipt display after reset           │
//! │                                                                         │
//! │  Mutations are optimistic: the cached snapshot updates immediately      │
//! │  and rolls back to the last confirmed state when the engine rejects     │
//! │  (insufficient stock, expired session, ...).                            │
//! │                                                                         │
//! │  LookupGate: a generation counter that drops results of superseded      │
//! │  barcode scans and searches (fast scanner, slow query).                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod lookup;
pub mod store;

pub use lookup::LookupGate;
pub use store::{ScanOutcome, TerminalSnapshot, TerminalStore};
