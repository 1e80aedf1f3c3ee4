//! # Purchases
//!
//! Goods received into a branch, optionally charged to a supplier.

use serde::Serialize;
use tracing::info;

use stockbook_core::{
    AccountLedgerEntry, EntryFields, EntryType, MovementContext, NegativeStockPolicy, Particular,
    SequenceKind, StockLedgerEntry,
};

use crate::engine::{Engine, Movement};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::PurchaseRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub invoice_no: String,
    pub stock_entry: StockLedgerEntry,
    /// The supplier debit, when a supplier was charged.
    pub account_entry: Option<AccountLedgerEntry>,
}

impl Engine {
    /// Increments stock and, with a supplier, records what we now owe them.
    pub async fn purchase(&self, request: PurchaseRequest) -> EngineResult<PurchaseReceipt> {
        request.validate()?;

        let mut keys = vec![LockKey::stock(&request.branch_id, &request.product)];
        if let Some(supplier_id) = &request.supplier_id {
            keys.push(LockKey::account(supplier_id));
        }
        let _locks = self.locks.acquire(keys).await?;

        let result = self.purchase_locked(&request).await;
        match &request.supplier_id {
            Some(supplier_id) => self.quarantine_on_replay_failure(supplier_id, result).await,
            None => result,
        }
    }

    async fn purchase_locked(&self, request: &PurchaseRequest) -> EngineResult<PurchaseReceipt> {
        let mut tx = self.db.begin().await?;

        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let mut supplier = match &request.supplier_id {
            Some(id) => {
                let account = self.load_account(&mut tx, id).await?;
                Self::ensure_reconciled(&account)?;
                Some(account)
            }
            None => None,
        };

        let invoice_no = self
            .resolve_ref(&mut tx, SequenceKind::Invoice, &branch, request.ref_no.as_deref())
            .await?;
        let product = self
            .load_product(&mut tx, &branch.id, &request.product)
            .await?;
        self.ensure_unrecorded(&mut tx, &product, Particular::Purchase, &invoice_no)
            .await?;

        let mut after = product.variants.clone();
        // an increase never trips the policy
        let delta = after.apply_delta(&request.unit_code, request.quantity, NegativeStockPolicy::Reject)?;

        let movement = Movement {
            particular: Particular::Purchase,
            ref_no: &invoice_no,
            date: request.date,
            context: MovementContext {
                operator: request.operator.clone(),
                counterparty: request.supplier_id.clone(),
                note: None,
            },
        };
        let stock_entry = self
            .commit_movement(&mut tx, &product, &after, &[delta], &movement)
            .await?;

        let mut account_entry = None;
        if let Some(account) = supplier.as_mut() {
            let amount = request.unit_cost.times(request.quantity)?;
            if amount.is_positive() {
                let fields = EntryFields {
                    entry_type: EntryType::SupplierDebit,
                    amount,
                    paid: request.paid,
                    date: request.date,
                };
                account_entry = Some(
                    self.post_entry(&mut tx, account, &branch.id, &invoice_no, fields)
                        .await?,
                );
                self.db.accounts().save_state(&mut tx, account).await?;
            }
        }

        tx.commit().await?;

        info!(%invoice_no, product = %product.name, quantity = %request.quantity, "Purchase recorded");
        Ok(PurchaseReceipt {
            invoice_no,
            stock_entry,
            account_entry,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::*;
    use stockbook_core::{AccountKind, Money, Quantity};

    #[tokio::test]
    async fn test_purchase_in_pieces() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 1).await;

        let receipt = engine
            .purchase(PurchaseRequest {
                branch_id: branch.id.clone(),
                product: "Biscuits".into(),
                unit_code: "piece".into(),
                quantity: Quantity::from_whole(36),
                date: day(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(receipt.invoice_no, "INV-MAIN-000001");
        assert!(receipt.account_entry.is_none());
        let line = receipt.stock_entry.line("PIECE").unwrap();
        assert_eq!(line.stock_in, Quantity::from_whole(36));
        assert_eq!(line.balance, Quantity::from_whole(48));

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(4));
    }

    #[tokio::test]
    async fn test_supplier_charged_for_purchase() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 0).await;
        let supplier = engine
            .create_account(AccountKind::Supplier, &branch.id, "Mills Ltd", None)
            .await
            .unwrap();

        let receipt = engine
            .purchase(PurchaseRequest {
                branch_id: branch.id.clone(),
                product: "Biscuits".into(),
                unit_code: "CARTON".into(),
                quantity: Quantity::from_whole(5),
                unit_cost: Money::from_major(300),
                supplier_id: Some(supplier.id.clone()),
                paid: Money::from_major(500),
                ref_no: Some("SUP-INV-9".into()),
                date: day(1),
                ..Default::default()
            })
            .await
            .unwrap();

        let entry = receipt.account_entry.unwrap();
        assert_eq!(entry.entry_type, EntryType::SupplierDebit);
        assert_eq!(entry.balance, Money::from_major(1000));
        let account = engine.find_account(&supplier.id).await.unwrap().unwrap();
        assert_eq!(account.current_balance, Money::from_major(1000));
    }

    #[tokio::test]
    async fn test_customer_cannot_be_charged_as_supplier() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 0).await;
        let customer = engine
            .create_account(AccountKind::Customer, &branch.id, "Ayesha", None)
            .await
            .unwrap();

        let err = engine
            .purchase(PurchaseRequest {
                branch_id: branch.id.clone(),
                product: "Biscuits".into(),
                unit_code: "CARTON".into(),
                quantity: Quantity::from_whole(1),
                unit_cost: Money::from_major(300),
                supplier_id: Some(customer.id.clone()),
                date: day(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::zero());
    }
}
