//! # Transfers
//!
//! Moving one variant of a product between two branches.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Validated ──► SourceDebited ──► DestCredited ──► Logged ──► Committed │
//! │      │               │                │              │                  │
//! │      └───────────────┴────────────────┴──────────────┴──► Failed       │
//! │                                                                         │
//! │  Every state before Committed lives inside one transaction, so Failed  │
//! │  always means "nothing happened" at either branch.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A destination branch that has never stocked the product gets a record
//! cloned from the source: same units, factors and prices, zero stock.
//!
//! Edits and deletes replay the difference through the same planning
//! function, so a deleted transfer puts the stock back exactly as it was
//! taken (up to conversion rounding of non-base units).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stockbook_core::transfer::{plan_movement, TransferTracker};
use stockbook_core::{
    ActionKind, Branch, MovementContext, NegativeStockPolicy, Particular, Quantity, SequenceKind,
    StockLedgerEntry, TransferRecord, TransferState,
};

use crate::engine::{snapshot, Engine, Movement};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::{EditTransferRequest, TransferRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub record: TransferRecord,
    pub source_entry: StockLedgerEntry,
    pub dest_entry: StockLedgerEntry,
    /// The destination product record was created by this transfer.
    pub destination_created: bool,
}

/// Ledger entries written by an edit or delete. Both are `None` when the
/// edit did not change the quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferCorrection {
    /// The record after the change; `None` once deleted.
    pub record: Option<TransferRecord>,
    pub source_entry: Option<StockLedgerEntry>,
    pub dest_entry: Option<StockLedgerEntry>,
}

impl Engine {
    /// Moves stock from one branch to another in a single unit of work.
    pub async fn transfer(&self, request: TransferRequest) -> EngineResult<TransferReceipt> {
        request.validate()?;

        let _locks = self
            .locks
            .acquire([
                LockKey::stock(&request.source_branch_id, &request.product),
                LockKey::stock(&request.dest_branch_id, &request.product),
            ])
            .await?;
        let mut tx = self.db.begin().await?;

        let source_branch = self.load_branch(&mut tx, &request.source_branch_id).await?;
        let dest_branch = self.load_branch(&mut tx, &request.dest_branch_id).await?;
        let ref_no = self
            .resolve_ref(&mut tx, SequenceKind::Transfer, &source_branch, request.ref_no.as_deref())
            .await?;

        let mut tracker = TransferTracker::validated(&ref_no);
        let result = self
            .run_transfer(&mut tx, &request, &source_branch, &dest_branch, &mut tracker)
            .await;

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Some(state) = tracker.fail() {
                    warn!(%ref_no, failed_in = %state, error = %err, "Transfer failed");
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        let (from, to) = tracker.advance(TransferState::Committed)?;
        debug!(%ref_no, %from, %to, "Transfer state");

        info!(
            %ref_no,
            product = %receipt.record.product_name,
            from = %source_branch.code,
            to = %dest_branch.code,
            quantity = %receipt.record.quantity,
            "Transfer committed"
        );
        Ok(receipt)
    }

    async fn run_transfer(
        &self,
        conn: &mut SqliteConnection,
        request: &TransferRequest,
        source_branch: &Branch,
        dest_branch: &Branch,
        tracker: &mut TransferTracker,
    ) -> EngineResult<TransferReceipt> {
        let ref_no = tracker.ref_no().to_string();
        let source = self
            .load_product(conn, &source_branch.id, &request.product)
            .await?;
        let destination = self
            .db
            .products()
            .find_by_name(conn, &dest_branch.id, &request.product)
            .await?;

        self.ensure_unrecorded(conn, &source, Particular::TransferOut, &ref_no)
            .await?;
        if let Some(dest) = &destination {
            self.ensure_unrecorded(conn, dest, Particular::TransferIn, &ref_no)
                .await?;
        }

        let plan = plan_movement(
            &source.variants,
            destination.as_ref().map(|p| &p.variants),
            &request.unit_code,
            request.quantity,
            NegativeStockPolicy::for_movement(
                request.allow_negative || source_branch.allow_negative_stock,
            ),
            NegativeStockPolicy::Reject,
        )?;

        let context = MovementContext {
            operator: request.operator.clone(),
            counterparty: None,
            note: None,
        };

        let out = Movement {
            particular: Particular::TransferOut,
            ref_no: &ref_no,
            date: request.date,
            context: MovementContext {
                counterparty: Some(dest_branch.id.clone()),
                ..context.clone()
            },
        };
        let source_entry = self
            .commit_movement(conn, &source, &plan.source, &[plan.source_delta.clone()], &out)
            .await?;
        let (from, to) = tracker.advance(TransferState::SourceDebited)?;
        debug!(%ref_no, %from, %to, "Transfer state");

        let inbound = Movement {
            particular: Particular::TransferIn,
            ref_no: &ref_no,
            date: request.date,
            context: MovementContext {
                counterparty: Some(source_branch.id.clone()),
                ..context
            },
        };
        let dest_deltas = [plan.destination_delta.clone()];
        let (dest_product_id, dest_entry) = match &destination {
            Some(dest) => {
                let entry = self
                    .commit_movement(conn, dest, &plan.destination, &dest_deltas, &inbound)
                    .await?;
                (dest.id.clone(), entry)
            }
            None => {
                let created = self
                    .db
                    .products()
                    .insert(
                        conn,
                        &dest_branch.id,
                        source.category.as_deref(),
                        &plan.destination,
                        Utc::now(),
                    )
                    .await?;
                info!(product = %created.name, branch = %dest_branch.code, "Product cloned into destination branch");
                let entry = self
                    .record_movement(
                        conn,
                        &created.id,
                        &dest_branch.id,
                        &plan.destination,
                        &dest_deltas,
                        &inbound,
                    )
                    .await?;
                (created.id, entry)
            }
        };
        let (from, to) = tracker.advance(TransferState::DestCredited)?;
        debug!(%ref_no, %from, %to, "Transfer state");

        let record = TransferRecord {
            id: Uuid::new_v4().to_string(),
            ref_no: ref_no.clone(),
            product_name: source.name.clone(),
            source_branch_id: source_branch.id.clone(),
            dest_branch_id: dest_branch.id.clone(),
            source_product_id: source.id.clone(),
            dest_product_id,
            unit_code: plan.source_delta.unit_code.clone(),
            quantity: request.quantity,
            date: request.date,
            operator: request.operator.clone(),
        };
        self.db.transfers().insert(conn, &record).await?;
        let (from, to) = tracker.advance(TransferState::Logged)?;
        debug!(%ref_no, %from, %to, "Transfer state");

        Ok(TransferReceipt {
            record,
            source_entry,
            dest_entry,
            destination_created: plan.destination_created,
        })
    }

    /// Changes a transfer's quantity, moving only the difference.
    pub async fn edit_transfer(&self, request: EditTransferRequest) -> EngineResult<TransferCorrection> {
        request.validate()?;
        let snapshot_record = self.transfer_record(&request.transfer_id).await?;
        let _locks = self.locks.acquire(transfer_keys(&snapshot_record)).await?;

        let mut tx = self.db.begin().await?;
        // reread under the lock
        let record = self.load_transfer(&mut tx, &request.transfer_id).await?;
        let moved = record.correction_to(request.quantity)?;
        if moved.is_zero() {
            return Ok(TransferCorrection {
                record: Some(record),
                source_entry: None,
                dest_entry: None,
            });
        }

        let (source_entry, dest_entry) = self
            .correct_transfer(
                &mut tx,
                &record,
                moved,
                Particular::TransferEdit,
                request.allow_negative,
                request.date,
                request.operator.as_deref(),
            )
            .await?;

        self.db
            .transfers()
            .update_quantity(&mut tx, &record.id, request.quantity)
            .await?;
        let updated = TransferRecord {
            quantity: request.quantity,
            ..record.clone()
        };
        self.log_action(
            &mut tx,
            ActionKind::TransferEdited,
            &record.id,
            Some(snapshot(&record)?),
            Some(snapshot(&updated)?),
            request.operator.as_deref(),
        )
        .await?;

        tx.commit().await?;

        info!(ref_no = %record.ref_no, from = %record.quantity, to = %request.quantity, "Transfer edited");
        Ok(TransferCorrection {
            record: Some(updated),
            source_entry: Some(source_entry),
            dest_entry: Some(dest_entry),
        })
    }

    /// Reverses a transfer and removes its record.
    pub async fn delete_transfer(
        &self,
        transfer_id: &str,
        allow_negative: bool,
        operator: Option<&str>,
    ) -> EngineResult<TransferCorrection> {
        let snapshot_record = self.transfer_record(transfer_id).await?;
        let _locks = self.locks.acquire(transfer_keys(&snapshot_record)).await?;

        let mut tx = self.db.begin().await?;
        let record = self.load_transfer(&mut tx, transfer_id).await?;

        let (source_entry, dest_entry) = self
            .correct_transfer(
                &mut tx,
                &record,
                record.reversal(),
                Particular::TransferDelete,
                allow_negative,
                Utc::now(),
                operator,
            )
            .await?;

        self.db.transfers().delete(&mut tx, &record.id).await?;
        self.log_action(
            &mut tx,
            ActionKind::TransferDeleted,
            &record.id,
            Some(snapshot(&record)?),
            None,
            operator,
        )
        .await?;

        tx.commit().await?;

        info!(ref_no = %record.ref_no, "Transfer deleted");
        Ok(TransferCorrection {
            record: None,
            source_entry: Some(source_entry),
            dest_entry: Some(dest_entry),
        })
    }

    /// Moves `moved` more units from source to destination (negative moves
    /// them back) and records both sides under the transfer's reference.
    #[allow(clippy::too_many_arguments)]
    async fn correct_transfer(
        &self,
        conn: &mut SqliteConnection,
        record: &TransferRecord,
        moved: Quantity,
        particular: Particular,
        allow_negative: bool,
        date: DateTime<Utc>,
        operator: Option<&str>,
    ) -> EngineResult<(StockLedgerEntry, StockLedgerEntry)> {
        let source_branch = self.load_branch(conn, &record.source_branch_id).await?;
        let dest_branch = self.load_branch(conn, &record.dest_branch_id).await?;
        let source = self.load_product_by_id(conn, &record.source_product_id).await?;
        let destination = self.load_product_by_id(conn, &record.dest_product_id).await?;

        let plan = plan_movement(
            &source.variants,
            Some(&destination.variants),
            &record.unit_code,
            moved,
            NegativeStockPolicy::for_movement(allow_negative || source_branch.allow_negative_stock),
            NegativeStockPolicy::for_movement(allow_negative || dest_branch.allow_negative_stock),
        )?;

        let context = MovementContext {
            operator: operator.map(str::to_string),
            counterparty: None,
            note: None,
        };
        let source_side = Movement {
            particular,
            ref_no: &record.ref_no,
            date,
            context: MovementContext {
                counterparty: Some(dest_branch.id.clone()),
                ..context.clone()
            },
        };
        let dest_side = Movement {
            particular,
            ref_no: &record.ref_no,
            date,
            context: MovementContext {
                counterparty: Some(source_branch.id.clone()),
                ..context
            },
        };

        let source_entry = self
            .commit_movement(conn, &source, &plan.source, &[plan.source_delta], &source_side)
            .await?;
        let dest_entry = self
            .commit_movement(
                conn,
                &destination,
                &plan.destination,
                &[plan.destination_delta],
                &dest_side,
            )
            .await?;

        Ok((source_entry, dest_entry))
    }

    async fn load_transfer(
        &self,
        conn: &mut SqliteConnection,
        transfer_id: &str,
    ) -> EngineResult<TransferRecord> {
        self.db
            .transfers()
            .find_by_id(conn, transfer_id)
            .await?
            .ok_or_else(|| TransferRecord::not_found(transfer_id).into())
    }

    /// Reads a transfer outside any transaction.
    pub async fn transfer_record(&self, transfer_id: &str) -> EngineResult<TransferRecord> {
        let mut conn = self.db.acquire().await?;
        self.load_transfer(&mut conn, transfer_id).await
    }
}

fn transfer_keys(record: &TransferRecord) -> [LockKey; 2] {
    [
        LockKey::stock(&record.source_branch_id, &record.product_name),
        LockKey::stock(&record.dest_branch_id, &record.product_name),
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::requests::SaleRequest;
    use crate::testing::*;
    use stockbook_core::{DateRange, Money};

    fn move_cartons(source: &str, dest: &str, qty: i64) -> TransferRequest {
        TransferRequest {
            source_branch_id: source.to_string(),
            dest_branch_id: dest.to_string(),
            product: "Biscuits".into(),
            unit_code: "CARTON".into(),
            quantity: Quantity::from_whole(qty),
            date: day(2),
            ..Default::default()
        }
    }

    async fn cartons(engine: &Engine, branch_id: &str) -> Quantity {
        engine
            .find_product(branch_id, "Biscuits")
            .await
            .unwrap()
            .map(|p| p.variants.get("CARTON").unwrap().quantity)
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_transfer_clones_product_into_new_branch() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        let source = create_biscuits(&engine, &main.id, 10).await;

        let receipt = engine.transfer(move_cartons(&main.id, &east.id, 5)).await.unwrap();

        assert!(receipt.destination_created);
        assert_eq!(receipt.record.ref_no, "TRF-MAIN-000001");
        assert_eq!(receipt.record.source_product_id, source.id);

        let dest = engine.find_product(&east.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(dest.id, receipt.record.dest_product_id);
        assert_eq!(dest.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(5));
        assert_eq!(dest.variants.get("PIECE").unwrap().quantity, Quantity::from_whole(60));
        assert_eq!(
            dest.variants.get("PIECE").unwrap().sell_price,
            source.variants.get("PIECE").unwrap().sell_price
        );
        assert_eq!(dest.variants.get("CARTON").unwrap().actual_revenue, Money::zero());
        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(5));

        assert_eq!(receipt.source_entry.particular, Particular::TransferOut);
        assert_eq!(receipt.dest_entry.particular, Particular::TransferIn);
        assert_eq!(
            receipt.dest_entry.line("CARTON").unwrap().stock_in,
            Quantity::from_whole(5)
        );
        assert!(receipt.dest_entry.matches(&dest.variants));
    }

    #[tokio::test]
    async fn test_failed_transfer_touches_neither_branch() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        let source = create_biscuits(&engine, &main.id, 10).await;

        let err = engine.transfer(move_cartons(&main.id, &east.id, 20)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        assert!(engine.find_product(&east.id, "Biscuits").await.unwrap().is_none());
        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(10));
        let history = engine
            .stock_history(&source.id, &main.id, DateRange::all())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_between_existing_products_conserves_stock() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        create_biscuits(&engine, &main.id, 10).await;
        create_biscuits(&engine, &east.id, 2).await;

        let mut request = move_cartons(&main.id, &east.id, 0);
        request.unit_code = "PIECE".into();
        request.quantity = Quantity::from_whole(30);
        let receipt = engine.transfer(request).await.unwrap();
        assert!(!receipt.destination_created);

        let main_cartons = cartons(&engine, &main.id).await;
        let east_cartons = cartons(&engine, &east.id).await;
        assert_eq!(main_cartons, Quantity::from_hundredths(750));
        assert_eq!(east_cartons, Quantity::from_hundredths(450));
        assert_eq!(
            main_cartons.checked_add(east_cartons).unwrap(),
            Quantity::from_whole(12)
        );
    }

    #[tokio::test]
    async fn test_edit_transfer_moves_only_the_difference() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        create_biscuits(&engine, &main.id, 10).await;
        let receipt = engine.transfer(move_cartons(&main.id, &east.id, 5)).await.unwrap();

        let edit = |qty: i64| EditTransferRequest {
            transfer_id: receipt.record.id.clone(),
            quantity: Quantity::from_whole(qty),
            date: day(3),
            ..Default::default()
        };

        let correction = engine.edit_transfer(edit(3)).await.unwrap();
        assert_eq!(correction.record.unwrap().quantity, Quantity::from_whole(3));
        let source_entry = correction.source_entry.unwrap();
        assert_eq!(source_entry.particular, Particular::TransferEdit);
        assert_eq!(source_entry.line("CARTON").unwrap().stock_in, Quantity::from_whole(2));
        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(7));
        assert_eq!(cartons(&engine, &east.id).await, Quantity::from_whole(3));

        engine.edit_transfer(edit(6)).await.unwrap();
        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(4));
        assert_eq!(cartons(&engine, &east.id).await, Quantity::from_whole(6));

        let unchanged = engine.edit_transfer(edit(6)).await.unwrap();
        assert!(unchanged.source_entry.is_none());

        let stored = engine.transfer_record(&receipt.record.id).await.unwrap();
        assert_eq!(stored.quantity, Quantity::from_whole(6));
        assert_eq!(engine.action_log(&receipt.record.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_transfer_restores_source() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        create_biscuits(&engine, &main.id, 10).await;
        let receipt = engine.transfer(move_cartons(&main.id, &east.id, 5)).await.unwrap();

        let correction = engine
            .delete_transfer(&receipt.record.id, false, Some("manager"))
            .await
            .unwrap();
        assert!(correction.record.is_none());
        assert_eq!(
            correction.dest_entry.unwrap().line("CARTON").unwrap().stock_out,
            Quantity::from_whole(5)
        );

        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(10));
        assert_eq!(cartons(&engine, &east.id).await, Quantity::zero());

        let err = engine.transfer_record(&receipt.record.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let log = engine.action_log(&receipt.record.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].after.is_none());
    }

    #[tokio::test]
    async fn test_delete_refused_when_destination_already_sold() {
        let (engine, main) = engine_with_branch("MAIN").await;
        let east = engine.create_branch("East", "EAST").await.unwrap();
        create_biscuits(&engine, &main.id, 10).await;
        let receipt = engine.transfer(move_cartons(&main.id, &east.id, 5)).await.unwrap();

        engine
            .sell(SaleRequest::new(&east.id).line(
                "Biscuits",
                "CARTON",
                Quantity::from_whole(4),
                Money::from_major(360),
            ))
            .await
            .unwrap();

        let err = engine
            .delete_transfer(&receipt.record.id, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(cartons(&engine, &main.id).await, Quantity::from_whole(5));
        assert_eq!(cartons(&engine, &east.id).await, Quantity::from_whole(1));
        assert!(engine.transfer_record(&receipt.record.id).await.is_ok());
    }
}
