//! # Error Types
//!
//! Domain-specific error types for tavola-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tavola-core errors (this file)                                        │
//! │  ├── CoreError        - Validation / state / not-found failures        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tavola-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is returned synchronously and nothing is retried here; the
//! command that raised it is rolled back by the storage layer.

use thiserror::Error;

use crate::types::{BillStatus, SessionStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification callers can branch on without matching variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any write.
    Validation,
    /// Request conflicts with the current entity state.
    State,
    /// Referenced session or bill does not exist.
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the billing lifecycle.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Bill id does not exist.
    #[error("Bill not found: {0}")]
    BillNotFound(String),

    /// Session is not in a status that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Settling a session that was never printed
    /// - Splitting a RUNNING or PAID session
    /// - Adding items to, or printing, a PAID session
    #[error("Session {session_id} is {current}, expected {expected}")]
    InvalidSessionStatus {
        session_id: String,
        current: SessionStatus,
        expected: String,
    },

    /// Bill is not OPEN.
    #[error("Bill {bill_id} is {current}, cannot {operation}")]
    InvalidBillStatus {
        bill_id: String,
        current: BillStatus,
        operation: String,
    },

    /// A split parent must be settled through its children.
    #[error("Session {0} has split children and cannot be settled directly")]
    SplitParentSettlement(String),

    /// A session can only be split once.
    #[error("Session {0} is already split")]
    AlreadySplit(String),

    /// Split requested with an out-of-range payer count.
    #[error("Split count must be between {min} and {max}, got {requested}")]
    InvalidSplitCount { requested: i64, min: i64, max: i64 },

    /// The recomputed session total is zero or negative.
    #[error("Cannot split session {0} with zero total")]
    NothingToSplit(String),

    /// Payments recorded against a bill do not cover its total.
    #[error("Bill {bill_id} is not fully paid: paid {paid_cents} of {total_cents}")]
    BillUnderpaid {
        bill_id: String,
        paid_cents: i64,
        total_cents: i64,
    },

    /// New orders for a table whose only open sessions are split shares.
    #[error("Table {0} has unpaid split shares; settle them before a new order")]
    SplitPending(String),

    /// Split view requested for a session with no parent.
    #[error("Session {0} is not a split child")]
    NotASplitChild(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error into the validation / state / not-found taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::SessionNotFound(_) | CoreError::BillNotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidSessionStatus { .. }
            | CoreError::InvalidBillStatus { .. }
            | CoreError::SplitParentSettlement(_)
            | CoreError::AlreadySplit(_)
            | CoreError::BillUnderpaid { .. }
            | CoreError::SplitPending(_)
            | CoreError::NotASplitChild(_) => ErrorKind::State,
            CoreError::InvalidSplitCount { .. }
            | CoreError::NothingToSplit(_)
            | CoreError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Shorthand for [`CoreError::InvalidSessionStatus`].
    pub fn invalid_status(
        session_id: impl Into<String>,
        current: SessionStatus,
        expected: impl Into<String>,
    ) -> Self {
        CoreError::InvalidSessionStatus {
            session_id: session_id.into(),
            current,
            expected: expected.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before a command opens its transaction.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
