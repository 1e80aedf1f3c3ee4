//! # Transfer Repository
//!
//! One row per cross-branch transfer. Edits rewrite the quantity, deletes
//! remove the row; the stock ledgers at both branches keep the history.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::from_millis;
use stockbook_core::{Quantity, TransferRecord};

#[derive(Debug, FromRow)]
struct TransferRow {
    id: String,
    ref_no: String,
    product_name: String,
    source_branch_id: String,
    dest_branch_id: String,
    source_product_id: String,
    dest_product_id: String,
    unit_code: String,
    quantity_hundredths: i64,
    date_ms: i64,
    operator: Option<String>,
}

impl TransferRow {
    fn into_record(self) -> DbResult<TransferRecord> {
        Ok(TransferRecord {
            date: from_millis(self.date_ms, "transfer", &self.id)?,
            id: self.id,
            ref_no: self.ref_no,
            product_name: self.product_name,
            source_branch_id: self.source_branch_id,
            dest_branch_id: self.dest_branch_id,
            source_product_id: self.source_product_id,
            dest_product_id: self.dest_product_id,
            unit_code: self.unit_code,
            quantity: Quantity::from_hundredths(self.quantity_hundredths),
            operator: self.operator,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferRepository;

impl TransferRepository {
    /// Inserts `record` as given, including its id.
    pub async fn insert(&self, conn: &mut SqliteConnection, record: &TransferRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, ref_no, product_name, source_branch_id, dest_branch_id,
                source_product_id, dest_product_id, unit_code, quantity_hundredths,
                date_ms, operator, created_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.id)
        .bind(&record.ref_no)
        .bind(&record.product_name)
        .bind(&record.source_branch_id)
        .bind(&record.dest_branch_id)
        .bind(&record.source_product_id)
        .bind(&record.dest_product_id)
        .bind(&record.unit_code)
        .bind(record.quantity.hundredths())
        .bind(record.date.timestamp_millis())
        .bind(&record.operator)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("transfer reference", &record.ref_no))?;

        debug!(id = %record.id, ref_no = %record.ref_no, "Transfer recorded");
        Ok(())
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<TransferRecord>> {
        let row = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, ref_no, product_name, source_branch_id, dest_branch_id,
                   source_product_id, dest_product_id, unit_code, quantity_hundredths,
                   date_ms, operator
            FROM transfers WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(TransferRow::into_record).transpose()
    }

    pub async fn update_quantity(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        quantity: Quantity,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE transfers SET quantity_hundredths = ?1 WHERE id = ?2")
            .bind(quantity.hundredths())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transfer", id));
        }
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM transfers WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transfer", id));
        }
        Ok(())
    }
}
