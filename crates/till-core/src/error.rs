//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                           │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  till-db errors                                                         │
//! │  └── DbError          - Storage failures, constraint violations         │
//! │                                                                         │
//! │  till-engine errors                                                     │
//! │  └── EngineError      - Core + Db + transport, what terminals see       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → terminal UI          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! Stock and lifecycle violations (`InsufficientStock`,
//! `DuplicateActiveSession`, `AlreadyCompleted`) are never retried
//! automatically; they surface to the cashier as actionable messages.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations and domain logic failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// SKU cannot be found in the catalog (or is inactive).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Not enough unreserved stock to cover the request.
    ///
    /// `available` is physical stock minus everyone else's live holds at
    /// the moment of the check. Surfaced to the cashier, never retried.
    #[error("Insufficient stock for {sku_id}: available {available}, requested {requested}")]
    InsufficientStock {
        sku_id: String,
        available: i64,
        requested: i64,
    },

    /// No session with the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session's deadline passed before the operation.
    ///
    /// On resume the caller is expected to fall back to creating a fresh
    /// session rather than treating this as a hard failure.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The register already carries an active session. The caller must
    /// fetch and attach to the existing one instead.
    #[error("Register {register_number} at store {store_id} already has an active session")]
    DuplicateActiveSession {
        store_id: String,
        register_number: String,
    },

    /// Cannot finalize a session with no cart lines.
    #[error("Cannot complete session {0}: cart is empty")]
    EmptyCart(String),

    /// The session was already finalized; the original transaction stands.
    #[error("Session {0} is already completed")]
    AlreadyCompleted(String),

    /// The session is not in a status that allows the operation.
    #[error("Session {session_id} is {current}, expected {expected}")]
    InvalidSessionStatus {
        session_id: String,
        current: String,
        expected: String,
    },

    /// Cart line not found in the session.
    #[error("Item {item_id} not in cart")]
    ItemNotInCart { item_id: String },

    /// Cart has exceeded the maximum number of distinct lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity above the allowed maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Quantity must be at least 1 on add.
    #[error("Quantity must be at least 1, got {requested}")]
    QuantityTooSmall { requested: i64 },

    /// Input validation failure (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures, caught before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (malformed email, bad characters in a code, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku_id: "WIG-001".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for WIG-001: available 1, requested 2"
        );

        let err = CoreError::DuplicateActiveSession {
            store_id: "store1".to_string(),
            register_number: "R1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Register R1 at store store1 already has an active session"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
