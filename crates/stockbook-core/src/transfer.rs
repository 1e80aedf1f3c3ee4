//! # Transfer Planning
//!
//! Pure half of a cross-branch stock movement: validation, the state
//! machine, and the paired variant mutations. Persistence and locking live
//! in the engine, which drives a [`TransferTracker`] through the states
//! while it writes.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Validated ──► SourceDebited ──► DestCredited ──► Logged ──► Committed  │
//! │      │               │                 │             │                  │
//! │      └───────────────┴─────────────────┴─────────────┴──► Failed        │
//! │                                                                         │
//! │  Failed and Committed are terminal.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Signed Movements
//! Transfer, edit and delete are one operation with a different signed
//! quantity moved from source to destination:
//!
//! | operation | moved            |
//! |-----------|------------------|
//! | transfer  | `+quantity`      |
//! | edit      | `new - old`      |
//! | delete    | `-old`           |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::variant::{NegativeStockPolicy, VariantDelta, VariantSet};

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Validated,
    SourceDebited,
    DestCredited,
    Logged,
    Committed,
    Failed,
}

impl TransferState {
    /// The single forward successor, if any.
    pub fn next(&self) -> Option<TransferState> {
        match self {
            TransferState::Validated => Some(TransferState::SourceDebited),
            TransferState::SourceDebited => Some(TransferState::DestCredited),
            TransferState::DestCredited => Some(TransferState::Logged),
            TransferState::Logged => Some(TransferState::Committed),
            TransferState::Committed | TransferState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Failed)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferState::Validated => "validated",
            TransferState::SourceDebited => "source_debited",
            TransferState::DestCredited => "dest_credited",
            TransferState::Logged => "logged",
            TransferState::Committed => "committed",
            TransferState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks one transfer through its states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTracker {
    ref_no: String,
    state: TransferState,
}

impl TransferTracker {
    /// A tracker starts once validation has passed.
    pub fn validated(ref_no: impl Into<String>) -> Self {
        Self {
            ref_no: ref_no.into(),
            state: TransferState::Validated,
        }
    }

    pub fn ref_no(&self) -> &str {
        &self.ref_no
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Moves to `to`, which must be the forward successor.
    pub fn advance(&mut self, to: TransferState) -> CoreResult<(TransferState, TransferState)> {
        if self.state.next() != Some(to) {
            return Err(ValidationError::InvalidFormat {
                field: "transfer state".to_string(),
                reason: format!("cannot move from {} to {}", self.state, to),
            }
            .into());
        }
        let from = self.state;
        self.state = to;
        Ok((from, to))
    }

    /// Marks the transfer failed. Returns the state it failed in, or `None`
    /// when it was already terminal.
    pub fn fail(&mut self) -> Option<TransferState> {
        if self.state.is_terminal() {
            return None;
        }
        let from = self.state;
        self.state = TransferState::Failed;
        Some(from)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Source and destination must differ and the quantity must be positive.
pub fn validate_transfer(
    source_branch_id: &str,
    dest_branch_id: &str,
    quantity: Quantity,
) -> Result<(), ValidationError> {
    if source_branch_id == dest_branch_id {
        return Err(ValidationError::MustDiffer {
            field: "destination branch".to_string(),
            other: "source branch".to_string(),
        });
    }
    if !quantity.is_positive() {
        return Err(ValidationError::positive("quantity"));
    }
    Ok(())
}

// =============================================================================
// Planning
// =============================================================================

/// Both sides of a movement after it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub source: VariantSet,
    pub destination: VariantSet,
    pub source_delta: VariantDelta,
    pub destination_delta: VariantDelta,
    /// The destination had no product record and was cloned from the source.
    pub destination_created: bool,
}

/// Applies `moved` units from `source` to `destination`.
///
/// `destination = None` clones the source's variant structure with zero
/// stock. Each side's policy only matters when that side is decremented.
/// Neither input is modified; on error nothing is planned.
pub fn plan_movement(
    source: &VariantSet,
    destination: Option<&VariantSet>,
    unit_code: &str,
    moved: Quantity,
    source_policy: NegativeStockPolicy,
    destination_policy: NegativeStockPolicy,
) -> CoreResult<TransferPlan> {
    let mut source_after = source.clone();
    let source_delta = source_after.apply_delta(unit_code, -moved, source_policy)?;

    let (mut destination_after, destination_created) = match destination {
        Some(existing) => (existing.clone(), false),
        None => (source.clone_structure()?, true),
    };
    let destination_delta = destination_after.apply_delta(unit_code, moved, destination_policy)?;

    Ok(TransferPlan {
        source: source_after,
        destination: destination_after,
        source_delta,
        destination_delta,
        destination_created,
    })
}

// =============================================================================
// Transfer Record
// =============================================================================

/// Durable record of one variant moved between two branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransferRecord {
    pub id: String,
    pub ref_no: String,
    pub product_name: String,
    pub source_branch_id: String,
    pub dest_branch_id: String,
    pub source_product_id: String,
    pub dest_product_id: String,
    pub unit_code: String,
    pub quantity: Quantity,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl TransferRecord {
    /// Signed movement needed to change this transfer to `new_quantity`.
    pub fn correction_to(&self, new_quantity: Quantity) -> CoreResult<Quantity> {
        new_quantity.checked_sub(self.quantity)
    }

    /// Signed movement that fully reverses this transfer.
    pub fn reversal(&self) -> Quantity {
        -self.quantity
    }

    pub fn not_found(id: &str) -> CoreError {
        CoreError::TransferNotFound(id.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::quantity::ConversionFactor;
    use crate::variant::{Conversion, VariantSpec};

    fn biscuits(base: i64) -> VariantSet {
        VariantSet::new(
            "Biscuits",
            Money::from_major(300),
            vec![
                VariantSpec {
                    unit_code: "CARTON".into(),
                    conversion: Conversion::BaseEquivalent,
                    sell_price: Money::from_major(360),
                    low_stock_alert: Quantity::zero(),
                },
                VariantSpec {
                    unit_code: "PIECE".into(),
                    conversion: Conversion::Proportional(ConversionFactor::from_whole(12).unwrap()),
                    sell_price: Money::from_major(35),
                    low_stock_alert: Quantity::zero(),
                },
            ],
            Quantity::from_whole(base),
        )
        .unwrap()
    }

    fn qty(set: &VariantSet, unit: &str) -> Quantity {
        set.get(unit).unwrap().quantity
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut t = TransferTracker::validated("TRF-A-000001");
        for to in [
            TransferState::SourceDebited,
            TransferState::DestCredited,
            TransferState::Logged,
            TransferState::Committed,
        ] {
            t.advance(to).unwrap();
        }
        assert_eq!(t.state(), TransferState::Committed);
        assert_eq!(t.fail(), None);
    }

    #[test]
    fn test_state_machine_rejects_skips() {
        let mut t = TransferTracker::validated("TRF-A-000001");
        assert!(t.advance(TransferState::DestCredited).is_err());
        assert_eq!(t.state(), TransferState::Validated);
    }

    #[test]
    fn test_failed_reachable_from_any_live_state() {
        let mut t = TransferTracker::validated("TRF-A-000001");
        t.advance(TransferState::SourceDebited).unwrap();
        assert_eq!(t.fail(), Some(TransferState::SourceDebited));
        assert_eq!(t.state(), TransferState::Failed);
        assert!(t.advance(TransferState::DestCredited).is_err());
    }

    #[test]
    fn test_validate_transfer() {
        assert!(validate_transfer("a", "b", Quantity::from_whole(1)).is_ok());
        assert!(validate_transfer("a", "a", Quantity::from_whole(1)).is_err());
        assert!(validate_transfer("a", "b", Quantity::zero()).is_err());
    }

    #[test]
    fn test_transfer_to_new_branch_clones_structure() {
        let source = biscuits(10);
        let plan = plan_movement(
            &source,
            None,
            "CARTON",
            Quantity::from_whole(5),
            NegativeStockPolicy::Reject,
            NegativeStockPolicy::Reject,
        )
        .unwrap();

        assert!(plan.destination_created);
        assert_eq!(qty(&plan.source, "CARTON"), Quantity::from_whole(5));
        assert_eq!(qty(&plan.destination, "CARTON"), Quantity::from_whole(5));
        assert_eq!(qty(&plan.destination, "PIECE"), Quantity::from_whole(60));
        assert_eq!(plan.source_delta.delta, Quantity::from_whole(-5));
        assert_eq!(plan.destination_delta.delta, Quantity::from_whole(5));
    }

    #[test]
    fn test_conservation_and_reversal() {
        let source = biscuits(10);
        let dest = biscuits(3);
        let before = qty(&source, "PIECE").hundredths() + qty(&dest, "PIECE").hundredths();

        let plan = plan_movement(
            &source,
            Some(&dest),
            "PIECE",
            Quantity::from_whole(24),
            NegativeStockPolicy::Reject,
            NegativeStockPolicy::Reject,
        )
        .unwrap();
        let after = qty(&plan.source, "PIECE").hundredths() + qty(&plan.destination, "PIECE").hundredths();
        assert_eq!(before, after);

        let undo = plan_movement(
            &plan.source,
            Some(&plan.destination),
            "PIECE",
            -Quantity::from_whole(24),
            NegativeStockPolicy::Reject,
            NegativeStockPolicy::Reject,
        )
        .unwrap();
        assert_eq!(undo.source, source);
        assert_eq!(undo.destination, dest);
    }

    #[test]
    fn test_insufficient_source_stock() {
        let source = biscuits(2);
        let err = plan_movement(
            &source,
            None,
            "CARTON",
            Quantity::from_whole(5),
            NegativeStockPolicy::Reject,
            NegativeStockPolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));

        let allowed = plan_movement(
            &source,
            None,
            "CARTON",
            Quantity::from_whole(5),
            NegativeStockPolicy::Allow,
            NegativeStockPolicy::Reject,
        )
        .unwrap();
        assert_eq!(qty(&allowed.source, "CARTON"), Quantity::from_whole(-3));
    }

    #[test]
    fn test_destination_missing_unit() {
        let source = biscuits(5);
        let dest = VariantSet::new(
            "Biscuits",
            Money::zero(),
            vec![VariantSpec {
                unit_code: "CARTON".into(),
                conversion: Conversion::BaseEquivalent,
                sell_price: Money::zero(),
                low_stock_alert: Quantity::zero(),
            }],
            Quantity::zero(),
        )
        .unwrap();

        let err = plan_movement(
            &source,
            Some(&dest),
            "PIECE",
            Quantity::from_whole(12),
            NegativeStockPolicy::Reject,
            NegativeStockPolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::VariantNotFound { .. }));
    }

    #[test]
    fn test_record_corrections() {
        let record = TransferRecord {
            id: "t1".into(),
            ref_no: "TRF-A-000001".into(),
            product_name: "Biscuits".into(),
            source_branch_id: "a".into(),
            dest_branch_id: "b".into(),
            source_product_id: "pa".into(),
            dest_product_id: "pb".into(),
            unit_code: "CARTON".into(),
            quantity: Quantity::from_whole(5),
            date: Utc::now(),
            operator: None,
        };
        assert_eq!(
            record.correction_to(Quantity::from_whole(3)).unwrap(),
            Quantity::from_whole(-2)
        );
        assert_eq!(record.reversal(), Quantity::from_whole(-5));
    }
}
