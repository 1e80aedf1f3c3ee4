//! # Engine Error Type
//!
//! Unified error type returned by every engine operation.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stockbook                              │
//! │                                                                         │
//! │  Request layer               Engine                                     │
//! │  ─────────────               ──────                                     │
//! │                                                                         │
//! │  engine.sell(request)                                                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Unit of work                                                    │  │
//! │  │  Result<T, EngineError>                                          │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Database Error? ─── DbError::Conflict ──────────────┐          │  │
//! │  │         │                                            │          │  │
//! │  │         ▼                                            ▼          │  │
//! │  │  Domain Error? ─── CoreError::InsufficientStock ── EngineError ─►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  match err.code {                                                       │
//! │      ErrorCode::InsufficientStock => offer the negative-stock override │
//! │      ErrorCode::ConcurrentMutationConflict => retry                    │
//! │      _ => show err.message                                             │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error aborts the whole unit of work; the transaction is rolled back
//! before the error reaches the caller.

use serde::Serialize;
use stockbook_core::CoreError;
use stockbook_db::DbError;

use crate::config::ConfigError;

/// Error returned from engine operations.
///
/// ## Serialization
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "insufficient stock for unit CARTON: available 3.00, requested 5.00"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unit code not present on the product
    VariantNotFound,

    /// Movement would take stock below zero
    InsufficientStock,

    /// Customer or supplier does not exist
    AccountNotFound,

    /// Negative or unusable conversion factor
    InvalidConversionFactor,

    /// Lock timeout or version mismatch; retry the operation
    ConcurrentMutationConflict,

    /// Account ledger could not be replayed; account needs reconciliation
    LedgerReplayFailure,

    /// Branch, product, transfer or ledger entry not found
    NotFound,

    /// Reference number already used for another movement
    DuplicateReference,

    /// Input validation failed
    ValidationError,

    /// Document number sequence could not be continued
    InvalidSequence,

    /// Database operation failed
    DatabaseError,

    /// Configuration could not be loaded
    ConfigError,

    /// Internal error
    Internal,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        EngineError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::new(ErrorCode::Internal, message)
    }

    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::ConcurrentMutationConflict
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => EngineError::new(
                ErrorCode::DuplicateReference,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::Conflict { entity, id } => EngineError::new(
                ErrorCode::ConcurrentMutationConflict,
                format!("{} {} was modified concurrently, retry the operation", entity, id),
            ),
            DbError::Corrupt { entity, id, reason } => {
                tracing::error!(%entity, %id, %reason, "Corrupt row");
                EngineError::new(ErrorCode::DatabaseError, format!("Stored {} is unreadable", entity))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                EngineError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::ConnectionFailed(_) => {
                EngineError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                EngineError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                EngineError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::PoolExhausted => {
                EngineError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                EngineError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        let code = match err {
            CoreError::VariantNotFound { .. } => ErrorCode::VariantNotFound,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            CoreError::InvalidConversionFactor { .. } => ErrorCode::InvalidConversionFactor,
            CoreError::ConcurrentMutationConflict { .. } => ErrorCode::ConcurrentMutationConflict,
            CoreError::LedgerReplayFailure { .. } => ErrorCode::LedgerReplayFailure,
            CoreError::ProductNotFound(_)
            | CoreError::BranchNotFound(_)
            | CoreError::TransferNotFound(_)
            | CoreError::EntryNotFound { .. } => ErrorCode::NotFound,
            CoreError::DuplicateReference { .. } => ErrorCode::DuplicateReference,
            CoreError::InvalidSequence { .. } => ErrorCode::InvalidSequence,
            CoreError::Overflow(_) => ErrorCode::ValidationError,
            CoreError::Validation(_) => ErrorCode::ValidationError,
        };
        EngineError::new(code, message)
    }
}

impl From<stockbook_core::ValidationError> for EngineError {
    fn from(err: stockbook_core::ValidationError) -> Self {
        EngineError::from(CoreError::from(err))
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::from(DbError::from(err))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
