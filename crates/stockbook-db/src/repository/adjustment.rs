//! # Adjustment Repository

use sqlx::{FromRow, SqliteConnection};

use crate::error::{DbError, DbResult};
use crate::repository::from_millis;
use stockbook_core::{AdjustmentDirection, Quantity, StockAdjustment};

#[derive(Debug, FromRow)]
struct AdjustmentRow {
    id: String,
    adjustment_no: String,
    branch_id: String,
    product_id: String,
    unit_code: String,
    direction: AdjustmentDirection,
    quantity_hundredths: i64,
    note: Option<String>,
    operator: Option<String>,
    date_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdjustmentRepository;

impl AdjustmentRepository {
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        adjustment: &StockAdjustment,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (
                id, adjustment_no, branch_id, product_id, unit_code, direction,
                quantity_hundredths, note, operator, date_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.adjustment_no)
        .bind(&adjustment.branch_id)
        .bind(&adjustment.product_id)
        .bind(&adjustment.unit_code)
        .bind(adjustment.direction)
        .bind(adjustment.quantity.hundredths())
        .bind(&adjustment.note)
        .bind(&adjustment.operator)
        .bind(adjustment.date.timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            DbError::from(e).with_duplicate_value("adjustment number", &adjustment.adjustment_no)
        })?;

        Ok(())
    }

    pub async fn list_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<StockAdjustment>> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(
            r#"
            SELECT id, adjustment_no, branch_id, product_id, unit_code, direction,
                   quantity_hundredths, note, operator, date_ms
            FROM stock_adjustments
            WHERE product_id = ?1
            ORDER BY date_ms, rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StockAdjustment {
                    date: from_millis(row.date_ms, "stock adjustment", &row.id)?,
                    id: row.id,
                    adjustment_no: row.adjustment_no,
                    branch_id: row.branch_id,
                    product_id: row.product_id,
                    unit_code: row.unit_code,
                    direction: row.direction,
                    quantity: Quantity::from_hundredths(row.quantity_hundredths),
                    note: row.note,
                    operator: row.operator,
                })
            })
            .collect()
    }
}
