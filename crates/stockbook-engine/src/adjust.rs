//! # Stock Adjustments
//!
//! Corrections after a count, breakage or write-off. A decrease that would
//! go below zero stops at zero unless negative stock is allowed, a decrease
//! on stock already below zero moves nothing, and the ledger entry records
//! what actually changed, not what was asked for.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use stockbook_core::validation::validate_note;
use stockbook_core::{
    AdjustmentDirection, MovementContext, NegativeStockPolicy, Particular, SequenceKind,
    StockAdjustment, StockLedgerEntry, VariantSet,
};

use crate::engine::{Engine, Movement};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::AdjustRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentReceipt {
    pub adjustment: StockAdjustment,
    pub stock_entry: StockLedgerEntry,
}

impl Engine {
    pub async fn adjust(&self, request: AdjustRequest) -> EngineResult<AdjustmentReceipt> {
        request.validate()?;
        let note = validate_note(request.note.as_deref())?;

        let _locks = self
            .locks
            .acquire([LockKey::stock(&request.branch_id, &request.product)])
            .await?;
        let mut tx = self.db.begin().await?;

        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let adjustment_no = self
            .issue_number(&mut tx, SequenceKind::Adjustment, &branch)
            .await?;
        let product = self
            .load_product(&mut tx, &branch.id, &request.product)
            .await?;

        let policy = match request.direction {
            AdjustmentDirection::Increase => NegativeStockPolicy::Reject,
            AdjustmentDirection::Decrease
                if request.allow_negative || branch.allow_negative_stock =>
            {
                NegativeStockPolicy::Allow
            }
            AdjustmentDirection::Decrease => NegativeStockPolicy::Clamp,
        };

        let mut after = product.variants.clone();
        let applied = after.apply_delta(
            &request.unit_code,
            request.direction.signed(request.quantity),
            policy,
        )?;
        // restated from the snapshots so a clamped decrease records what moved
        let deltas = VariantSet::diff(&product.variants, &after);
        let requested = request.direction.signed(request.quantity);
        let moved = deltas
            .iter()
            .find(|d| d.unit_code == applied.unit_code)
            .map(|d| d.delta)
            .unwrap_or_default();
        if moved != requested {
            warn!(
                product = %product.name,
                unit = %applied.unit_code,
                requested = %requested,
                moved = %moved,
                "Decrease clamped"
            );
        }

        let movement = Movement {
            particular: Particular::Adjustment,
            ref_no: &adjustment_no,
            date: request.date,
            context: MovementContext {
                operator: request.operator.clone(),
                counterparty: None,
                note: note.clone(),
            },
        };
        let stock_entry = self
            .commit_movement(&mut tx, &product, &after, &deltas, &movement)
            .await?;

        let adjustment = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            adjustment_no: adjustment_no.clone(),
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            unit_code: applied.unit_code,
            direction: request.direction,
            quantity: request.quantity,
            note,
            operator: request.operator.clone(),
            date: request.date,
        };
        self.db.adjustments().insert(&mut tx, &adjustment).await?;

        tx.commit().await?;

        info!(%adjustment_no, product = %product.name, direction = ?request.direction, "Stock adjusted");
        Ok(AdjustmentReceipt {
            adjustment,
            stock_entry,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
