//! # Sales Repository
//!
//! Sold lines, one row per unit sold on a receipt.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. ISSUE RECEIPT NUMBER                                               │
//! │     └── numbers().issue(Receipt) → "RCP-MAIN-000042"                   │
//! │                                                                         │
//! │  2. MOVE STOCK                                                         │
//! │     └── products().update_variants() + stock_ledger().append()         │
//! │                                                                         │
//! │  3. RECORD LINE (this module)                                          │
//! │     └── sales().insert() → SalesLine { in_stock_after, sales_type }    │
//! │                                                                         │
//! │  4. (CREDIT ONLY) POST TO CUSTOMER                                     │
//! │     └── account_ledger().append()                                      │
//! │                                                                         │
//! │  All four steps share one transaction.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::from_millis;
use stockbook_core::{DateRange, Money, Quantity, SalesLine, SalesType};

#[derive(Debug, FromRow)]
struct SalesRow {
    id: String,
    receipt_no: String,
    branch_id: String,
    product_id: String,
    product_name: String,
    unit_code: String,
    unit_price_cents: i64,
    quantity_hundredths: i64,
    amount_cents: i64,
    customer_id: Option<String>,
    in_stock_after_hundredths: i64,
    sales_type: SalesType,
    date_ms: i64,
}

impl SalesRow {
    fn into_line(self) -> DbResult<SalesLine> {
        Ok(SalesLine {
            date: from_millis(self.date_ms, "sales line", &self.id)?,
            id: self.id,
            receipt_no: self.receipt_no,
            branch_id: self.branch_id,
            product_id: self.product_id,
            product_name: self.product_name,
            unit_code: self.unit_code,
            unit_price: Money::from_cents(self.unit_price_cents),
            quantity: Quantity::from_hundredths(self.quantity_hundredths),
            amount: Money::from_cents(self.amount_cents),
            customer_id: self.customer_id,
            in_stock_after: Quantity::from_hundredths(self.in_stock_after_hundredths),
            sales_type: self.sales_type,
        })
    }
}

const SELECT_LINE: &str = r#"
    SELECT id, receipt_no, branch_id, product_id, product_name, unit_code,
           unit_price_cents, quantity_hundredths, amount_cents, customer_id,
           in_stock_after_hundredths, sales_type, date_ms
    FROM sales_ledger
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct SalesRepository;

impl SalesRepository {
    pub async fn insert(&self, conn: &mut SqliteConnection, line: &SalesLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales_ledger (
                id, receipt_no, branch_id, product_id, product_name, unit_code,
                unit_price_cents, quantity_hundredths, amount_cents, customer_id,
                in_stock_after_hundredths, sales_type, date_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&line.id)
        .bind(&line.receipt_no)
        .bind(&line.branch_id)
        .bind(&line.product_id)
        .bind(&line.product_name)
        .bind(&line.unit_code)
        .bind(line.unit_price.cents())
        .bind(line.quantity.hundredths())
        .bind(line.amount.cents())
        .bind(&line.customer_id)
        .bind(line.in_stock_after.hundredths())
        .bind(line.sales_type)
        .bind(line.date.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        debug!(receipt_no = %line.receipt_no, amount = %line.amount, "Sales line recorded");
        Ok(())
    }

    pub async fn list_by_receipt(
        &self,
        conn: &mut SqliteConnection,
        receipt_no: &str,
    ) -> DbResult<Vec<SalesLine>> {
        let rows = sqlx::query_as::<_, SalesRow>(&format!(
            "{SELECT_LINE} WHERE receipt_no = ?1 ORDER BY rowid"
        ))
        .bind(receipt_no)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(SalesRow::into_line).collect()
    }

    pub async fn list_by_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        range: DateRange,
    ) -> DbResult<Vec<SalesLine>> {
        let (from_ms, to_ms) = range.millis();
        let rows = sqlx::query_as::<_, SalesRow>(&format!(
            "{SELECT_LINE} WHERE branch_id = ?1 AND date_ms >= ?2 AND date_ms <= ?3 ORDER BY date_ms, rowid"
        ))
        .bind(branch_id)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(SalesRow::into_line).collect()
    }
}
