//! # till-core: Pure Business Logic for Till POS
//!
//! This crate contains the point-of-sale domain as pure functions with zero
//! I/O dependencies: money arithmetic, the cart engine, session and
//! transaction types, and input validation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 till-terminal (per register)                    │   │
//! │  │    Client session store, optimistic apply, lookup gate          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 till-engine (server side)                       │   │
//! │  │    Session lifecycle, hold ledger, transaction finalizer        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐    │   │
//! │  │   │   types   │  │   money   │  │   cart    │  │ validation│    │   │
//! │  │   │  Session  │  │   Money   │  │   Cart    │  │   rules   │    │   │
//! │  │   │Transaction│  │  TaxRate  │  │ CartItem  │  │  checks   │    │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic given its inputs
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are cents (i64), never floats
//! 4. **Explicit Errors**: all failures are typed enums, never strings

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem, CartTotals};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, TaxRate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
///
/// Prevents runaway carts and keeps session snapshots small enough to
/// persist on every mutation.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line in a cart.
///
/// Guards against fat-finger entries (typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// How long a session lives without being completed or voided before it
/// counts as expired. Expiry is evaluated lazily on read, never by timer.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
