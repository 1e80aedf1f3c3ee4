//! # Stock Ledger Repository
//!
//! Append-only storage of stock movements. There is no update or delete;
//! corrections are new rows tagged `transfer_edit` / `transfer_delete`.
//!
//! Entries read back in write order (`seq`, the AUTOINCREMENT rowid), since
//! each entry's balances are snapshots taken when it was written. The
//! movement date `date_ms` only filters.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{from_millis, new_id};
use stockbook_core::stock_ledger::NewStockEntry;
use stockbook_core::{DateRange, LedgerLine, MovementContext, Particular, StockLedgerEntry};

#[derive(Debug, FromRow)]
struct StockLedgerRow {
    seq: i64,
    id: String,
    product_id: String,
    branch_id: String,
    particular: Particular,
    ref_no: String,
    date_ms: i64,
    lines_json: String,
    operator: Option<String>,
    counterparty: Option<String>,
    note: Option<String>,
}

impl StockLedgerRow {
    fn into_entry(self) -> DbResult<StockLedgerEntry> {
        let lines: Vec<LedgerLine> = serde_json::from_str(&self.lines_json)
            .map_err(|e| DbError::corrupt("stock ledger entry", &self.id, e))?;

        Ok(StockLedgerEntry {
            date: from_millis(self.date_ms, "stock ledger entry", &self.id)?,
            id: self.id,
            seq: self.seq,
            product_id: self.product_id,
            branch_id: self.branch_id,
            particular: self.particular,
            ref_no: self.ref_no,
            lines,
            context: MovementContext {
                operator: self.operator,
                counterparty: self.counterparty,
                note: self.note,
            },
        })
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT seq, id, product_id, branch_id, particular, ref_no, date_ms,
           lines_json, operator, counterparty, note
    FROM stock_ledger
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedgerRepository;

impl StockLedgerRepository {
    /// Appends one movement.
    ///
    /// A second non-correction movement with the same
    /// `(product, branch, particular, ref_no)` fails with
    /// [`DbError::UniqueViolation`].
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewStockEntry,
    ) -> DbResult<StockLedgerEntry> {
        let id = new_id();
        let lines_json = serde_json::to_string(&entry.lines)
            .map_err(|e| DbError::corrupt("stock ledger entry", &id, e))?;

        let result = sqlx::query(
            r#"
            INSERT INTO stock_ledger (
                id, product_id, branch_id, particular, ref_no, date_ms,
                lines_json, operator, counterparty, note, created_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&id)
        .bind(&entry.product_id)
        .bind(&entry.branch_id)
        .bind(entry.particular)
        .bind(&entry.ref_no)
        .bind(entry.date.timestamp_millis())
        .bind(&lines_json)
        .bind(&entry.context.operator)
        .bind(&entry.context.counterparty)
        .bind(&entry.context.note)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("stock ledger reference", &entry.ref_no))?;

        let seq = result.last_insert_rowid();
        debug!(
            seq,
            product_id = %entry.product_id,
            branch_id = %entry.branch_id,
            particular = %entry.particular,
            ref_no = %entry.ref_no,
            "Stock ledger entry appended"
        );

        Ok(StockLedgerEntry {
            id,
            seq,
            product_id: entry.product_id.clone(),
            branch_id: entry.branch_id.clone(),
            particular: entry.particular,
            ref_no: entry.ref_no.clone(),
            date: from_millis(entry.date.timestamp_millis(), "stock ledger entry", &entry.ref_no)?,
            lines: entry.lines.clone(),
            context: entry.context.clone(),
        })
    }

    /// True if a movement with this reference is already recorded.
    pub async fn exists(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        particular: Particular,
        ref_no: &str,
    ) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_ledger
            WHERE product_id = ?1 AND branch_id = ?2 AND particular = ?3 AND ref_no = ?4
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(particular)
        .bind(ref_no)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count > 0)
    }

    /// History of one product in one branch in write order, limited to
    /// movements whose date falls in `range`. Both range ends are inclusive.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        range: DateRange,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let (from_ms, to_ms) = range.millis();
        let rows = sqlx::query_as::<_, StockLedgerRow>(&format!(
            r#"{SELECT_ENTRY}
            WHERE product_id = ?1 AND branch_id = ?2 AND date_ms >= ?3 AND date_ms <= ?4
            ORDER BY seq ASC"#
        ))
        .bind(product_id)
        .bind(branch_id)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(StockLedgerRow::into_entry).collect()
    }

    /// Most recently written entry, by creation order.
    pub async fn latest(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<StockLedgerEntry>> {
        let row = sqlx::query_as::<_, StockLedgerRow>(&format!(
            "{SELECT_ENTRY} WHERE product_id = ?1 AND branch_id = ?2 ORDER BY seq DESC LIMIT 1"
        ))
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(StockLedgerRow::into_entry).transpose()
    }

    /// Every entry written under one reference, in creation order.
    pub async fn list_by_ref(
        &self,
        conn: &mut SqliteConnection,
        ref_no: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let rows = sqlx::query_as::<_, StockLedgerRow>(&format!(
            "{SELECT_ENTRY} WHERE ref_no = ?1 ORDER BY seq ASC"
        ))
        .bind(ref_no)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(StockLedgerRow::into_entry).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{DateTime, Duration, TimeZone};
    use stockbook_core::{Conversion, Money, Quantity, VariantSet, VariantSpec};

    fn rice() -> VariantSet {
        VariantSet::new(
            "Rice",
            Money::from_major(50),
            vec![VariantSpec {
                unit_code: "BAG".into(),
                conversion: Conversion::BaseEquivalent,
                sell_price: Money::from_major(60),
                low_stock_alert: Quantity::zero(),
            }],
            Quantity::from_whole(4),
        )
        .unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::days(n)
    }

    fn entry(product_id: &str, branch_id: &str, particular: Particular, ref_no: &str, date: DateTime<Utc>) -> NewStockEntry {
        NewStockEntry::record(
            product_id,
            branch_id,
            &rice(),
            particular,
            ref_no,
            date,
            &[],
            MovementContext::default(),
        )
        .unwrap()
    }

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let branch = db.branches().insert(&mut conn, "Main", "MAIN").await.unwrap();
        let product = db
            .products()
            .insert(&mut conn, &branch.id, None, &rice(), Utc::now())
            .await
            .unwrap();
        (db, branch.id, product.id)
    }

    #[tokio::test]
    async fn test_list_orders_by_write_order() {
        let (db, branch_id, product_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let repo = db.stock_ledger();

        repo.append(&mut conn, &entry(&product_id, &branch_id, Particular::Sale, "R2", day(2)))
            .await
            .unwrap();
        repo.append(&mut conn, &entry(&product_id, &branch_id, Particular::Sale, "R1", day(1)))
            .await
            .unwrap();
        repo.append(&mut conn, &entry(&product_id, &branch_id, Particular::Purchase, "R3", day(2)))
            .await
            .unwrap();

        let all = repo
            .list(&mut conn, &product_id, &branch_id, DateRange::all())
            .await
            .unwrap();
        let refs: Vec<&str> = all.iter().map(|e| e.ref_no.as_str()).collect();
        assert_eq!(refs, vec!["R2", "R1", "R3"]);
        assert_eq!(all.last().unwrap().seq, all.iter().map(|e| e.seq).max().unwrap());

        let latest = repo.latest(&mut conn, &product_id, &branch_id).await.unwrap().unwrap();
        assert_eq!(latest.ref_no, "R3");

        let ranged = repo
            .list(&mut conn, &product_id, &branch_id, DateRange::between(day(2), day(3)))
            .await
            .unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[tokio::test]
    async fn test_reference_is_unique_except_for_corrections() {
        let (db, branch_id, product_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let repo = db.stock_ledger();

        repo.append(&mut conn, &entry(&product_id, &branch_id, Particular::Sale, "R1", day(1)))
            .await
            .unwrap();
        let err = repo
            .append(&mut conn, &entry(&product_id, &branch_id, Particular::Sale, "R1", day(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "R1"));

        for _ in 0..2 {
            repo.append(
                &mut conn,
                &entry(&product_id, &branch_id, Particular::TransferEdit, "R1", day(1)),
            )
            .await
            .unwrap();
        }

        assert!(repo
            .exists(&mut conn, &product_id, &branch_id, Particular::Sale, "R1")
            .await
            .unwrap());
        assert!(!repo
            .exists(&mut conn, &product_id, &branch_id, Particular::Purchase, "R1")
            .await
            .unwrap());
        assert_eq!(repo.list_by_ref(&mut conn, "R1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_lines_round_trip() {
        let (db, branch_id, product_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();

        let new = entry(&product_id, &branch_id, Particular::Opening, "OPEN", day(0));
        let appended = db.stock_ledger().append(&mut conn, &new).await.unwrap();
        let stored = db
            .stock_ledger()
            .latest(&mut conn, &product_id, &branch_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored, appended);
        assert_eq!(stored.line("bag").unwrap().balance, Quantity::from_whole(4));
    }
}
