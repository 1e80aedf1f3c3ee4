//! # History & Reports
//!
//! Read-only views. None of these take aggregate locks; each reads from
//! one pooled connection.

use tracing::debug;

use stockbook_core::{
    AccountLedgerEntry, ActionLogEntry, DateRange, LowStockItem, PriceAdjustment, SalesLine,
    StockAdjustment, StockLedgerEntry,
};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Stock ledger of one product in one branch, oldest first.
    pub async fn stock_history(
        &self,
        product_id: &str,
        branch_id: &str,
        range: DateRange,
    ) -> EngineResult<Vec<StockLedgerEntry>> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .db
            .stock_ledger()
            .list(&mut conn, product_id, branch_id, range)
            .await?)
    }

    /// Account ledger with running balances, in replay order.
    pub async fn account_history(
        &self,
        account_id: &str,
        range: DateRange,
    ) -> EngineResult<Vec<AccountLedgerEntry>> {
        let mut conn = self.db.acquire().await?;
        self.load_account(&mut conn, account_id).await?;
        Ok(self
            .db
            .account_ledger()
            .list(&mut conn, account_id, range)
            .await?)
    }

    /// Every variant of every product in the branch at or below its alert.
    pub async fn low_stock(&self, branch_id: &str) -> EngineResult<Vec<LowStockItem>> {
        let mut conn = self.db.acquire().await?;
        self.load_branch(&mut conn, branch_id).await?;
        let products = self.db.products().list_by_branch(&mut conn, branch_id).await?;

        let items: Vec<LowStockItem> = products
            .iter()
            .flat_map(|p| p.low_stock_items())
            .collect();
        debug!(%branch_id, products = products.len(), low = items.len(), "Low stock report");
        Ok(items)
    }

    pub async fn receipt_lines(&self, receipt_no: &str) -> EngineResult<Vec<SalesLine>> {
        let mut conn = self.db.acquire().await?;
        let lines = self
            .db
            .sales()
            .list_by_receipt(&mut conn, receipt_no.trim())
            .await?;
        if lines.is_empty() {
            return Err(EngineError::not_found("Receipt", receipt_no.trim()));
        }
        Ok(lines)
    }

    /// Sales lines of a branch within `range`.
    pub async fn sales_lines(&self, branch_id: &str, range: DateRange) -> EngineResult<Vec<SalesLine>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.db.sales().list_by_branch(&mut conn, branch_id, range).await?)
    }

    pub async fn adjustments(&self, product_id: &str) -> EngineResult<Vec<StockAdjustment>> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .db
            .adjustments()
            .list_for_product(&mut conn, product_id)
            .await?)
    }

    /// Sell-price changes of one product, oldest first.
    pub async fn price_history(&self, product_id: &str) -> EngineResult<Vec<PriceAdjustment>> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .db
            .price_adjustments()
            .list_for_product(&mut conn, product_id)
            .await?)
    }

    /// Corrections recorded against a branch, account, product or transfer id.
    pub async fn action_log(&self, subject: &str) -> EngineResult<Vec<ActionLogEntry>> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .db
            .action_log()
            .list_for_subject(&mut conn, subject)
            .await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
