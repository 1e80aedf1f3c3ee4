//! # Price Adjustment Repository
//!
//! History of sell-price changes, one row per changed variant. Rows are
//! never updated.

use sqlx::{FromRow, SqliteConnection};

use crate::error::DbResult;
use crate::repository::from_millis;
use stockbook_core::{Money, PriceAdjustment};

#[derive(Debug, FromRow)]
struct PriceAdjustmentRow {
    id: String,
    branch_id: String,
    product_id: String,
    unit_code: String,
    old_price_cents: i64,
    new_price_cents: i64,
    note: Option<String>,
    operator: Option<String>,
    created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceAdjustmentRepository;

impl PriceAdjustmentRepository {
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        adjustment: &PriceAdjustment,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO price_adjustments (
                id, branch_id, product_id, unit_code, old_price_cents,
                new_price_cents, note, operator, created_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.branch_id)
        .bind(&adjustment.product_id)
        .bind(&adjustment.unit_code)
        .bind(adjustment.old_price.cents())
        .bind(adjustment.new_price.cents())
        .bind(&adjustment.note)
        .bind(&adjustment.operator)
        .bind(adjustment.created_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Price changes of one product, oldest first.
    pub async fn list_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<PriceAdjustment>> {
        let rows = sqlx::query_as::<_, PriceAdjustmentRow>(
            r#"
            SELECT id, branch_id, product_id, unit_code, old_price_cents,
                   new_price_cents, note, operator, created_at_ms
            FROM price_adjustments
            WHERE product_id = ?1
            ORDER BY created_at_ms, rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PriceAdjustment {
                    created_at: from_millis(row.created_at_ms, "price adjustment", &row.id)?,
                    id: row.id,
                    branch_id: row.branch_id,
                    product_id: row.product_id,
                    unit_code: row.unit_code,
                    old_price: Money::from_cents(row.old_price_cents),
                    new_price: Money::from_cents(row.new_price_cents),
                    note: row.note,
                    operator: row.operator,
                })
            })
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
