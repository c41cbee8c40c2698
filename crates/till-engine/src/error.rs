//! # Engine Error Types
//!
//! The error surface terminals see. Wraps domain and storage errors and
//! adds the one failure only the finalizer can produce: a commit coming
//! up short because physical stock changed between hold and commit.

use thiserror::Error;

use till_core::CoreError;
use till_db::{DbError, ShortLine};

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule violation (insufficient stock, bad status, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Holds could not be converted to stock decrements; nothing was
    /// written and the cashier must correct the listed lines.
    #[error("Cannot complete sale: {} line(s) no longer covered by stock", .0.len())]
    CommitShort(Vec<ShortLine>),

    /// Storage failure not expressible as a domain error.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl EngineError {
    /// True when the error is the cashier's to fix (re-prompt), rather
    /// than an infrastructure fault.
    pub fn is_actionable(&self) -> bool {
        matches!(self, EngineError::Core(_) | EngineError::CommitShort(_))
    }
}

/// Convenience alias for Results with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_short_message_counts_lines() {
        let err = EngineError::CommitShort(vec![ShortLine {
            sku_id: "wig-001".to_string(),
            available: 1,
            requested: 2,
        }]);
        assert_eq!(
            err.to_string(),
            "Cannot complete sale: 1 line(s) no longer covered by stock"
        );
        assert!(err.is_actionable());
    }

    #[test]
    fn test_db_errors_are_not_actionable() {
        let err = EngineError::Db(DbError::PoolExhausted);
        assert!(!err.is_actionable());
    }
}
