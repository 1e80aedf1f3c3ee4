//! # Stock Ledger
//!
//! Append-only movement records per product per branch.
//!
//! ## Entry Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StockLedgerEntry  (sale SL-0001, Biscuits @ Branch A)                  │
//! │                                                                         │
//! │   unit     stock_in   stock_out   balance                               │
//! │   ──────   ────────   ─────────   ───────                               │
//! │   CARTON       0.00        2.00      8.00   ← moved unit                │
//! │   PIECE        0.00        0.00     96.00   ← recomputed, not moved     │
//! │                                                                         │
//! │  balance = quantity AFTER the movement, for every variant               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Corrections never rewrite an entry. They append a new one tagged with
//! an edit/delete [`Particular`], so scanning a product's entries in
//! `(date, seq)` order always reconstructs its true history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::validation::normalize_unit_code;
use crate::variant::{VariantDelta, VariantSet};

// =============================================================================
// Particular
// =============================================================================

/// What kind of business event produced a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Particular {
    Opening,
    Sale,
    Purchase,
    Adjustment,
    TransferOut,
    TransferIn,
    TransferEdit,
    TransferDelete,
    /// Quantities restated by editing the product.
    ProductEdit,
}

impl Particular {
    pub fn as_str(&self) -> &'static str {
        match self {
            Particular::Opening => "opening",
            Particular::Sale => "sale",
            Particular::Purchase => "purchase",
            Particular::Adjustment => "adjustment",
            Particular::TransferOut => "transfer_out",
            Particular::TransferIn => "transfer_in",
            Particular::TransferEdit => "transfer_edit",
            Particular::TransferDelete => "transfer_delete",
            Particular::ProductEdit => "product_edit",
        }
    }

    /// Corrections may legitimately repeat a reference (one transfer can be
    /// edited many times), so they are exempt from reference dedupe.
    pub fn is_correction(&self) -> bool {
        matches!(self, Particular::TransferEdit | Particular::TransferDelete)
    }
}

impl fmt::Display for Particular {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ledger Lines
// =============================================================================

/// One variant's row inside a stock ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerLine {
    pub unit_code: String,
    pub stock_in: Quantity,
    pub stock_out: Quantity,
    pub balance: Quantity,
}

/// Builds the per-variant breakdown for a movement.
///
/// Every variant of `post` gets exactly one line. A unit named in `deltas`
/// gets its signed movement split into `stock_in`/`stock_out`; the others
/// get zeros. `balance` is always the post-movement quantity.
///
/// Pass explicit deltas for a plain movement, or
/// [`VariantSet::diff`] of the pre/post snapshots for a restatement.
pub fn breakdown(post: &VariantSet, deltas: &[VariantDelta]) -> CoreResult<Vec<LedgerLine>> {
    let mut moved: Vec<(String, i64)> = Vec::with_capacity(deltas.len());
    for delta in deltas {
        let code = normalize_unit_code(&delta.unit_code)?;
        if post.find(&code).is_none() {
            return Err(CoreError::VariantNotFound {
                product: post.product().to_string(),
                unit_code: code,
            });
        }
        match moved.iter_mut().find(|(c, _)| *c == code) {
            Some((_, sum)) => {
                *sum = sum
                    .checked_add(delta.delta.hundredths())
                    .ok_or_else(|| CoreError::Overflow("ledger movement".to_string()))?;
            }
            None => moved.push((code, delta.delta.hundredths())),
        }
    }

    Ok(post
        .variants()
        .iter()
        .map(|variant| {
            let net = moved
                .iter()
                .find(|(c, _)| *c == variant.unit_code)
                .map(|(_, sum)| *sum)
                .unwrap_or(0);
            LedgerLine {
                unit_code: variant.unit_code.clone(),
                stock_in: Quantity::from_hundredths(net.max(0)),
                stock_out: Quantity::from_hundredths((-net).max(0)),
                balance: variant.quantity,
            }
        })
        .collect())
}

// =============================================================================
// Entries
// =============================================================================

/// Optional attribution carried on an entry. Never used in business rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementContext {
    pub operator: Option<String>,
    pub counterparty: Option<String>,
    pub note: Option<String>,
}

/// A stock ledger entry ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockEntry {
    pub product_id: String,
    pub branch_id: String,
    pub particular: Particular,
    pub ref_no: String,
    pub date: DateTime<Utc>,
    pub lines: Vec<LedgerLine>,
    pub context: MovementContext,
}

impl NewStockEntry {
    /// Builds an entry for `set` after a movement.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        product_id: &str,
        branch_id: &str,
        set: &VariantSet,
        particular: Particular,
        ref_no: &str,
        date: DateTime<Utc>,
        deltas: &[VariantDelta],
        context: MovementContext,
    ) -> CoreResult<Self> {
        Ok(Self {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            particular,
            ref_no: ref_no.to_string(),
            date,
            lines: breakdown(set, deltas)?,
            context,
        })
    }
}

/// A stored stock ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLedgerEntry {
    pub id: String,
    /// Write order. History is listed by it, not by `date`.
    pub seq: i64,
    pub product_id: String,
    pub branch_id: String,
    pub particular: Particular,
    pub ref_no: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub lines: Vec<LedgerLine>,
    pub context: MovementContext,
}

impl StockLedgerEntry {
    pub fn line(&self, unit_code: &str) -> Option<&LedgerLine> {
        let code = normalize_unit_code(unit_code).ok()?;
        self.lines.iter().find(|l| l.unit_code == code)
    }

    /// True when this entry's balances equal the live quantities of `set`.
    pub fn matches(&self, set: &VariantSet) -> bool {
        self.lines.len() == set.variants().len()
            && set.variants().iter().all(|v| {
                self.lines
                    .iter()
                    .any(|l| l.unit_code == v.unit_code && l.balance == v.quantity)
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
