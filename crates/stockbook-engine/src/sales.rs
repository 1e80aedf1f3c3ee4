//! # Sales
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         sell(request)                                   │
//! │                                                                         │
//! │  lock every product@branch on the receipt (+ the customer)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  receipt no. ─── given, or next RCP-{BRANCH}-NNNNNN                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  per product:  apply_delta(unit, -qty) for each line                   │
//! │                record_revenue(unit, price × qty)                       │
//! │                one stock ledger entry, one sales line per line         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  customer?  cash   → paid_sales   (amount = paid = total)              │
//! │             credit → credit_sales (amount = total, paid = down pmt)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  commit                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use stockbook_core::validation::product_key;
use stockbook_core::{
    AccountLedgerEntry, CoreError, EntryFields, EntryType, Money, MovementContext,
    NegativeStockPolicy, Particular, SalesLine, SalesType, SequenceKind, StockLedgerEntry,
};

use crate::engine::{Engine, Movement};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::{SaleLineRequest, SalePayment, SaleRequest};

/// Everything one receipt wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleReceipt {
    pub receipt_no: String,
    pub lines: Vec<SalesLine>,
    pub stock_entries: Vec<StockLedgerEntry>,
    pub account_entry: Option<AccountLedgerEntry>,
    pub total: Money,
}

/// Lines grouped by product, in first-seen order.
fn group_by_product(lines: &[SaleLineRequest]) -> Vec<(String, Vec<&SaleLineRequest>)> {
    let mut groups: Vec<(String, Vec<&SaleLineRequest>)> = Vec::new();
    for line in lines {
        let key = product_key(&line.product);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(line),
            None => groups.push((key, vec![line])),
        }
    }
    groups
}

impl Engine {
    /// Sells one or more lines under a single receipt.
    ///
    /// Decrements stock (rejecting shortfalls unless the request or branch
    /// allows negative stock), records revenue per variant, writes one
    /// sales line per line and posts the receipt to the customer's ledger
    /// when a customer is named. Retrying a receipt fails with
    /// `DuplicateReference` and changes nothing.
    pub async fn sell(&self, request: SaleRequest) -> EngineResult<SaleReceipt> {
        request.validate()?;

        let mut keys: Vec<LockKey> = request
            .lines
            .iter()
            .map(|l| LockKey::stock(&request.branch_id, &l.product))
            .collect();
        if let Some(customer_id) = &request.customer_id {
            keys.push(LockKey::account(customer_id));
        }
        let _locks = self.locks.acquire(keys).await?;

        let result = self.sell_locked(&request).await;
        match &request.customer_id {
            Some(customer_id) => self.quarantine_on_replay_failure(customer_id, result).await,
            None => result,
        }
    }

    async fn sell_locked(&self, request: &SaleRequest) -> EngineResult<SaleReceipt> {
        let mut tx = self.db.begin().await?;

        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let mut customer = match &request.customer_id {
            Some(id) => {
                let account = self.load_account(&mut tx, id).await?;
                Self::ensure_reconciled(&account)?;
                Some(account)
            }
            None => None,
        };

        let receipt_no = self
            .resolve_ref(&mut tx, SequenceKind::Receipt, &branch, request.ref_no.as_deref())
            .await?;
        let policy =
            NegativeStockPolicy::for_movement(request.allow_negative || branch.allow_negative_stock);
        let sales_type = match request.payment {
            SalePayment::Cash => SalesType::Cash,
            SalePayment::Credit { .. } => SalesType::Credit,
        };

        let mut lines = Vec::with_capacity(request.lines.len());
        let mut stock_entries = Vec::new();
        let mut total = Money::zero();

        for (_, group) in group_by_product(&request.lines) {
            let (entry, sold) = self
                .sell_product(&mut tx, request, &group, &receipt_no, policy, sales_type)
                .await?;
            for line in &sold {
                total = total
                    .checked_add(line.amount)
                    .ok_or_else(|| CoreError::Overflow("receipt total".to_string()))?;
            }
            stock_entries.push(entry);
            lines.extend(sold);
        }

        for line in &lines {
            self.db.sales().insert(&mut tx, line).await?;
        }

        let mut account_entry = None;
        if let Some(account) = customer.as_mut() {
            match request.payment {
                SalePayment::Cash => account.cash_sales_count += 1,
                SalePayment::Credit { .. } => account.credit_sales_count += 1,
            }
            account.sales_amount = account
                .sales_amount
                .checked_add(total)
                .ok_or_else(|| CoreError::Overflow("customer sales amount".to_string()))?;

            if total.is_positive() {
                let fields = match request.payment {
                    SalePayment::Cash => EntryFields {
                        entry_type: EntryType::PaidSales,
                        amount: total,
                        paid: total,
                        date: request.date,
                    },
                    SalePayment::Credit { paid } => EntryFields {
                        entry_type: EntryType::CreditSales,
                        amount: total,
                        paid,
                        date: request.date,
                    },
                };
                account_entry = Some(
                    self.post_entry(&mut tx, account, &branch.id, &receipt_no, fields)
                        .await?,
                );
            }
            self.db.accounts().save_state(&mut tx, account).await?;
        }

        tx.commit().await?;

        info!(
            %receipt_no,
            branch = %branch.code,
            lines = lines.len(),
            total = %total,
            sales_type = ?sales_type,
            "Sale recorded"
        );

        Ok(SaleReceipt {
            receipt_no,
            lines,
            stock_entries,
            account_entry,
            total,
        })
    }

    async fn sell_product(
        &self,
        conn: &mut SqliteConnection,
        request: &SaleRequest,
        group: &[&SaleLineRequest],
        receipt_no: &str,
        policy: NegativeStockPolicy,
        sales_type: SalesType,
    ) -> EngineResult<(StockLedgerEntry, Vec<SalesLine>)> {
        let product = self
            .load_product(conn, &request.branch_id, &group[0].product)
            .await?;
        self.ensure_unrecorded(conn, &product, Particular::Sale, receipt_no)
            .await?;

        let mut after = product.variants.clone();
        let mut deltas = Vec::with_capacity(group.len());
        let mut sold = Vec::with_capacity(group.len());

        for line in group {
            let delta = after.apply_delta(&line.unit_code, -line.quantity, policy)?;
            let amount = line.unit_price.times(line.quantity)?;
            after.record_revenue(&delta.unit_code, amount)?;

            sold.push(SalesLine {
                id: Uuid::new_v4().to_string(),
                receipt_no: receipt_no.to_string(),
                branch_id: product.branch_id.clone(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                unit_code: delta.unit_code.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                amount,
                customer_id: request.customer_id.clone(),
                in_stock_after: after.get(&delta.unit_code)?.quantity,
                sales_type,
                date: request.date,
            });
            deltas.push(delta);
        }

        let movement = Movement {
            particular: Particular::Sale,
            ref_no: receipt_no,
            date: request.date,
            context: MovementContext {
                operator: request.operator.clone(),
                counterparty: request.customer_id.clone(),
                note: None,
            },
        };
        let entry = self
            .commit_movement(conn, &product, &after, &deltas, &movement)
            .await?;

        Ok((entry, sold))
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
    use stockbook_core::{AccountKind, DateRange, Quantity};

    #[tokio::test]
    async fn test_carton_sale_updates_every_variant() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;

        let receipt = engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "CARTON",
                Quantity::from_whole(2),
                Money::from_major(360),
            ))
            .await
            .unwrap();

        assert_eq!(receipt.receipt_no, "RCP-MAIN-000001");
        assert_eq!(receipt.total, Money::from_major(720));
        assert_eq!(receipt.lines[0].in_stock_after, Quantity::from_whole(8));

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        let carton = product.variants.get("CARTON").unwrap();
        let piece = product.variants.get("PIECE").unwrap();
        assert_eq!(carton.quantity, Quantity::from_whole(8));
        assert_eq!(piece.quantity, Quantity::from_whole(96));
        assert_eq!(carton.actual_revenue, Money::from_major(720));
        assert_eq!(carton.total_worth, Money::from_major(2400));

        let entry = &receipt.stock_entries[0];
        let carton_line = entry.line("CARTON").unwrap();
        assert_eq!(carton_line.stock_out, Quantity::from_whole(2));
        assert_eq!(carton_line.balance, Quantity::from_whole(8));
        let piece_line = entry.line("PIECE").unwrap();
        assert_eq!(piece_line.stock_out, Quantity::zero());
        assert_eq!(piece_line.balance, Quantity::from_whole(96));
        assert!(entry.matches(&product.variants));
    }

    #[tokio::test]
    async fn test_piece_sale_scales_back_to_cartons() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;

        engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "PIECE",
                Quantity::from_whole(24),
                Money::from_major(35),
            ))
            .await
            .unwrap();

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(8));
        assert_eq!(product.variants.get("PIECE").unwrap().quantity, Quantity::from_whole(96));
        assert_eq!(
            product.variants.get("PIECE").unwrap().actual_revenue,
            Money::from_major(840)
        );
    }

    #[tokio::test]
    async fn test_shortfall_rejected_and_nothing_written() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let product = create_biscuits(&engine, &branch.id, 3).await;

        let err = engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "CARTON",
                Quantity::from_whole(5),
                Money::from_major(360),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        let reloaded = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(reloaded.variants, product.variants);
        let history = engine
            .stock_history(&product.id, &branch.id, DateRange::all())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // the failed sale did not consume a receipt number
        let receipt = engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "CARTON",
                Quantity::from_whole(1),
                Money::from_major(360),
            ))
            .await
            .unwrap();
        assert_eq!(receipt.receipt_no, "RCP-MAIN-000001");
    }

    #[tokio::test]
    async fn test_negative_stock_with_override() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 3).await;

        engine
            .sell(
                SaleRequest::new(&branch.id)
                    .line("Biscuits", "CARTON", Quantity::from_whole(5), Money::from_major(360))
                    .allow_negative(),
            )
            .await
            .unwrap();
        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(-2));

        engine.set_allow_negative_stock(&branch.id, true, None).await.unwrap();
        engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "PIECE",
                Quantity::from_whole(12),
                Money::from_major(35),
            ))
            .await
            .unwrap();
        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(-3));
    }

    #[tokio::test]
    async fn test_concurrent_sales_of_one_product_both_land() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let product = create_biscuits(&engine, &branch.id, 10).await;

        let sale = |qty: i64| {
            SaleRequest::new(&branch.id)
                .line("Biscuits", "CARTON", Quantity::from_whole(qty), Money::from_major(360))
                .dated(day(1))
        };
        let (first, second) = tokio::join!(engine.sell(sale(2)), engine.sell(sale(3)));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.receipt_no, second.receipt_no);

        let live = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(live.variants.base_quantity(), Quantity::from_whole(5));
        assert_eq!(live.version, 3);

        let history = engine
            .stock_history(&product.id, &branch.id, stockbook_core::DateRange::all())
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.last().unwrap().matches(&live.variants));
    }

    #[tokio::test]
    async fn test_retried_receipt_is_rejected() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;
        let request = SaleRequest::new(&branch.id)
            .line("Biscuits", "CARTON", Quantity::from_whole(1), Money::from_major(360))
            .ref_no("R-100");

        engine.sell(request.clone()).await.unwrap();
        let err = engine.sell(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateReference);

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(product.variants.get("CARTON").unwrap().quantity, Quantity::from_whole(9));
    }

    #[tokio::test]
    async fn test_multi_line_receipt_one_entry_per_product() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;
        create_rice(&engine, &branch.id, 50).await;

        let receipt = engine
            .sell(
                SaleRequest::new(&branch.id)
                    .line("Biscuits", "CARTON", Quantity::from_whole(1), Money::from_major(360))
                    .line("Rice", "KG", Quantity::from_whole(5), Money::from_major(2))
                    .line("biscuits", "PIECE", Quantity::from_whole(6), Money::from_major(35)),
            )
            .await
            .unwrap();

        assert_eq!(receipt.lines.len(), 3);
        assert_eq!(receipt.stock_entries.len(), 2);
        assert_eq!(receipt.total, Money::from_major(360 + 10 + 210));

        let product = engine.find_product(&branch.id, "Biscuits").await.unwrap().unwrap();
        assert_eq!(
            product.variants.get("CARTON").unwrap().quantity,
            Quantity::from_hundredths(850)
        );
        assert_eq!(receipt.lines[2].in_stock_after, Quantity::from_whole(102));

        let stored = engine.receipt_lines(&receipt.receipt_no).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_credit_sale_posts_to_customer() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;
        let customer = engine
            .create_account(AccountKind::Customer, &branch.id, "Ayesha", None)
            .await
            .unwrap();

        let receipt = engine
            .sell(
                SaleRequest::new(&branch.id)
                    .line("Biscuits", "CARTON", Quantity::from_whole(1), Money::from_major(360))
                    .on_credit(&customer.id, Money::from_major(60)),
            )
            .await
            .unwrap();

        let entry = receipt.account_entry.unwrap();
        assert_eq!(entry.entry_type, EntryType::CreditSales);
        assert_eq!(entry.balance, Money::from_major(-300));
        assert_eq!(receipt.lines[0].sales_type, SalesType::Credit);

        let account = engine.find_account(&customer.id).await.unwrap().unwrap();
        assert_eq!(account.current_balance, Money::from_major(-300));
        assert_eq!(account.credit_sales_count, 1);
        assert_eq!(account.sales_amount, Money::from_major(360));
    }

    #[tokio::test]
    async fn test_cash_sale_with_customer_nets_to_zero() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;
        let customer = engine
            .create_account(AccountKind::Customer, &branch.id, "Bilal", None)
            .await
            .unwrap();

        let receipt = engine
            .sell(
                SaleRequest::new(&branch.id)
                    .line("Biscuits", "CARTON", Quantity::from_whole(1), Money::from_major(360))
                    .customer(&customer.id),
            )
            .await
            .unwrap();

        assert_eq!(receipt.account_entry.unwrap().entry_type, EntryType::PaidSales);
        let account = engine.find_account(&customer.id).await.unwrap().unwrap();
        assert_eq!(account.current_balance, Money::zero());
        assert_eq!(account.cash_sales_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_unit_and_product() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_biscuits(&engine, &branch.id, 10).await;

        let err = engine
            .sell(SaleRequest::new(&branch.id).line(
                "Biscuits",
                "CRATE",
                Quantity::from_whole(1),
                Money::from_major(1),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VariantNotFound);

        let err = engine
            .sell(SaleRequest::new(&branch.id).line(
                "Cookies",
                "CARTON",
                Quantity::from_whole(1),
                Money::from_major(1),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
