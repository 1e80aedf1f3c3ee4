//! # Error Types
//!
//! Domain-specific error types for stockbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbook-core errors (this file)                                     │
//! │  ├── CoreError        - Conversion, ledger and transfer failures       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockbook-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockbook-engine errors                                               │
//! │  └── EngineError      - What the request layer sees (code + message)   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → request failure     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant aborts the calling unit of work. Only
/// [`CoreError::InsufficientStock`] is recoverable by caller choice (the
/// branch-level negative stock override), and only
/// [`CoreError::ConcurrentMutationConflict`] is worth retrying as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No variant of the product carries the requested unit code.
    #[error("unit {unit_code} not found on product {product}")]
    VariantNotFound { product: String, unit_code: String },

    /// Requested movement would take the variant below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// sell(CARTON, qty 5)
    ///      │
    ///      ▼
    /// available = 3, policy = Reject
    ///      │
    ///      ▼
    /// InsufficientStock { unit_code: "CARTON", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// "insufficient stock for unit CARTON: available 3.00, requested 5.00"
    /// ```
    #[error("insufficient stock for unit {unit_code}: available {available}, requested {requested}")]
    InsufficientStock {
        unit_code: String,
        available: Quantity,
        requested: Quantity,
    },

    /// Customer or supplier account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Conversion factor is negative or otherwise unusable.
    #[error("invalid conversion factor for unit {unit_code}: {reason}")]
    InvalidConversionFactor { unit_code: String, reason: String },

    /// Per-aggregate exclusivity could not be obtained, or the row changed
    /// underneath us. Retry the whole operation.
    #[error("concurrent mutation conflict on {aggregate}")]
    ConcurrentMutationConflict { aggregate: String },

    /// Chronological replay of an account ledger hit corrupted ordering.
    ///
    /// Fatal for the account: further mutations are blocked until the
    /// ledger is reconciled.
    #[error("ledger replay failed for account {account}: {reason}")]
    LedgerReplayFailure { account: String, reason: String },

    /// Product cannot be found in the branch.
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// Branch cannot be found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Transfer record cannot be found.
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    /// Account ledger entry cannot be found.
    #[error("ledger entry {ref_no} not found on account {account}")]
    EntryNotFound { account: String, ref_no: String },

    /// A reference number was reused for a different movement.
    #[error("reference {ref_no} already recorded for {scope}")]
    DuplicateReference { scope: String, ref_no: String },

    /// The last issued number could not be parsed.
    #[error("cannot continue sequence {prefix} from '{last}'")]
    InvalidSequence { prefix: String, last: String },

    /// Arithmetic left the representable range.
    #[error("arithmetic overflow while computing {0}")]
    Overflow(String),

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a ConcurrentMutationConflict for the given aggregate key.
    pub fn conflict(aggregate: impl Into<String>) -> Self {
        CoreError::ConcurrentMutationConflict {
            aggregate: aggregate.into(),
        }
    }

    /// Creates a LedgerReplayFailure.
    pub fn replay_failure(account: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::LedgerReplayFailure {
            account: account.into(),
            reason: reason.into(),
        }
    }

    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConcurrentMutationConflict { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised while building typed requests at the request-layer boundary,
/// before any stock or balance is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., unparseable number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate unit code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Two fields that must differ are equal.
    #[error("{field} must differ from {other}")]
    MustDiffer { field: String, other: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
