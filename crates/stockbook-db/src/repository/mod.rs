//! # Repository Module
//!
//! Database repository implementations for Stockbook.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Engine unit of work                                                   │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       │  db.products().find_by_name(&mut tx, branch, "Rice")           │
//! │       │  db.stock_ledger().append(&mut tx, &entry)                     │
//! │       │  tx.commit().await?;                                           │
//! │       ▼                                                                 │
//! │  Repositories                                                          │
//! │  ├── hold no connection of their own                                   │
//! │  ├── take `&mut SqliteConnection` on every call                       │
//! │  └── decode rows into stockbook-core types                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Several repositories share one transaction                          │
//! │  • SQL is isolated in one place                                        │
//! │  • Domain types never see row encodings (cents, ms, JSON)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BranchRepository`] - Branches and the negative-stock toggle
//! - [`ProductRepository`] - Per-branch products with versioned variants
//! - [`StockLedgerRepository`] - Append-only stock movements
//! - [`AccountRepository`] - Customers and suppliers
//! - [`AccountLedgerRepository`] - Running-balance entries
//! - [`TransferRepository`] - Cross-branch transfer records
//! - [`SalesRepository`] - Sold lines
//! - [`AdjustmentRepository`] - Stock adjustment records
//! - [`PriceAdjustmentRepository`] - Sell-price history
//! - [`NumberRepository`] - Issued document numbers
//! - [`ActionLogRepository`] - Audit trail of corrections

pub mod account;
pub mod action_log;
pub mod adjustment;
pub mod branch;
pub mod numbers;
pub mod price_adjustment;
pub mod product;
pub mod sale;
pub mod stock_ledger;
pub mod transfer;

pub use account::{AccountLedgerRepository, AccountRepository, NewAccountEntry};
pub use action_log::ActionLogRepository;
pub use adjustment::AdjustmentRepository;
pub use branch::BranchRepository;
pub use numbers::NumberRepository;
pub use price_adjustment::PriceAdjustmentRepository;
pub use product::ProductRepository;
pub use sale::SalesRepository;
pub use stock_ledger::StockLedgerRepository;
pub use transfer::TransferRepository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// New UUID v4 primary key.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Decodes a stored epoch-millisecond column.
pub(crate) fn from_millis(ms: i64, entity: &str, id: &str) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::corrupt(entity, id, format!("timestamp {ms} out of range")))
}
