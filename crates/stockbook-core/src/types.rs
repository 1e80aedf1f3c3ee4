//! # Domain Types
//!
//! Records shared by the storage and engine layers.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Branch      │   │     Product     │   │     Account     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  code (prefix)  │   │  branch_id (FK) │   │  kind           │       │
//! │  │  allow_negative │   │  variants       │   │  current_balance│       │
//! │  └─────────────────┘   │  version        │   │  version        │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SalesLine     │   │ StockAdjustment │   │ ActionLogEntry  │       │
//! │  │  receipt_no     │   │  direction      │   │  action         │       │
//! │  │  sales_type     │   │  note, operator │   │  before / after │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger entries and transfer records live next to their logic in
//! [`crate::stock_ledger`], [`crate::account_ledger`] and [`crate::transfer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::account_ledger::AccountKind;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::variant::VariantSet;

// =============================================================================
// Branch
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Branch {
    pub id: String,
    pub name: String,
    /// Short upper-case code used in document numbers.
    pub code: String,
    /// Lets sales and transfers take stock below zero.
    pub allow_negative_stock: bool,
}

// =============================================================================
// Product
// =============================================================================

/// A product as stocked in one branch.
///
/// The same product name in two branches is two records; stock is never
/// shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub category: Option<String>,
    pub variants: VariantSet,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One low-stock line of a branch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockItem {
    pub product_id: String,
    pub product_name: String,
    pub unit_code: String,
    pub quantity: Quantity,
    pub low_stock_alert: Quantity,
}

impl Product {
    pub fn low_stock_items(&self) -> Vec<LowStockItem> {
        self.variants
            .low_stock()
            .into_iter()
            .map(|v| LowStockItem {
                product_id: self.id.clone(),
                product_name: self.name.clone(),
                unit_code: v.unit_code.clone(),
                quantity: v.quantity,
                low_stock_alert: v.low_stock_alert,
            })
            .collect()
    }
}

// =============================================================================
// Account
// =============================================================================

/// A customer or supplier with a running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Account {
    pub id: String,
    pub kind: AccountKind,
    pub branch_id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Cached balance of the chronologically last ledger entry.
    pub current_balance: Money,
    /// Set when a replay failed; blocks mutation until reconciled.
    pub reconcile_required: bool,
    pub cash_sales_count: i64,
    pub credit_sales_count: i64,
    pub sales_amount: Money,
    pub version: i64,
}

// =============================================================================
// Sales Lines
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SalesType {
    Cash,
    Credit,
}

/// One sold line, kept for sales reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesLine {
    pub id: String,
    pub receipt_no: String,
    pub branch_id: String,
    pub product_id: String,
    pub product_name: String,
    pub unit_code: String,
    pub unit_price: Money,
    pub quantity: Quantity,
    pub amount: Money,
    pub customer_id: Option<String>,
    /// Quantity of the sold unit left after the sale.
    pub in_stock_after: Quantity,
    pub sales_type: SalesType,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

// =============================================================================
// Stock Adjustments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Increase,
    Decrease,
}

impl AdjustmentDirection {
    /// Applies the direction to an unsigned quantity.
    pub fn signed(&self, quantity: Quantity) -> Quantity {
        match self {
            AdjustmentDirection::Increase => quantity,
            AdjustmentDirection::Decrease => -quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub adjustment_no: String,
    pub branch_id: String,
    pub product_id: String,
    pub unit_code: String,
    pub direction: AdjustmentDirection,
    /// Requested quantity. A clamped decrease may move less.
    pub quantity: Quantity,
    pub note: Option<String>,
    pub operator: Option<String>,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

/// One sell-price change of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceAdjustment {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    pub unit_code: String,
    pub old_price: Money,
    pub new_price: Money,
    pub note: Option<String>,
    pub operator: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Action Log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LedgerEntryEdited,
    LedgerEntryDeleted,
    AccountReconciled,
    TransferEdited,
    TransferDeleted,
    NegativeStockToggled,
    ProductEdited,
}

/// Audit record of a correction. `before`/`after` are JSON snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActionLogEntry {
    pub id: String,
    pub action: ActionKind,
    /// What was acted on, e.g. an account or transfer id.
    pub subject: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub operator: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive date filter for history reads. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }

    /// Bounds as epoch milliseconds, the storage representation.
    pub fn millis(&self) -> (i64, i64) {
        (
            self.from.map_or(i64::MIN, |d| d.timestamp_millis()),
            self.to.map_or(i64::MAX, |d| d.timestamp_millis()),
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
