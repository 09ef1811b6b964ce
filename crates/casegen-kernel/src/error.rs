//! Error types for the session kernel

use crate::types::{Phase, SessionStatus};

/// Illegal state changes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the legality table
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Stored phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },

    /// Session no longer accepts checked transitions
    #[error("session is {status:?}; only administrative transitions are allowed")]
    Terminal {
        /// Current status
        status: SessionStatus,
    },
}

/// Persistence failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing record
        what: String,
    },

    /// Record already exists
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the duplicate record
        what: String,
    },

    /// Uniqueness violation on a case number; the batch was rolled back
    #[error("case number {case_number} already exists in set {target_set}")]
    DuplicateCase {
        /// Target case set
        target_set: String,
        /// Offending case number
        case_number: String,
    },

    /// Category path deeper than the store allows
    #[error("category depth {depth} exceeds limit {limit}")]
    CategoryDepthExceeded {
        /// Requested depth
        depth: usize,
        /// Store limit
        limit: usize,
    },

    /// Category name rejected by the store
    #[error("invalid category name: {0:?}")]
    InvalidCategory(String),

    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`]
    #[inline]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Whether the category could not be created and a fallback applies
    #[inline]
    #[must_use]
    pub fn is_category_rejection(&self) -> bool {
        matches!(
            self,
            Self::CategoryDepthExceeded { .. } | Self::InvalidCategory(_)
        )
    }
}

/// Combined kernel error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// State machine rejected the change
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Store rejected the change
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_display() {
        let err = StateMachineError::IllegalTransition {
            from: Phase::Init,
            to: Phase::Commit,
        };
        assert_eq!(err.to_string(), "illegal transition init -> commit");
    }

    #[test]
    fn category_rejection_classification() {
        assert!(StoreError::CategoryDepthExceeded { depth: 6, limit: 5 }.is_category_rejection());
        assert!(!StoreError::not_found("session").is_category_rejection());
    }

    #[test]
    fn error_conversions() {
        let err: KernelError = StoreError::not_found("draft").into();
        assert!(matches!(err, KernelError::Store(StoreError::NotFound { .. })));
    }
}
