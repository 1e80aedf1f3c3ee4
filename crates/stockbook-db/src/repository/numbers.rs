//! # Issued Numbers Repository
//!
//! Persistence half of document numbering. The engine reads the last
//! value with [`NumberRepository::last_issued`], derives the next one with
//! `SequenceGenerator`, and stores it with [`NumberRepository::record`],
//! all inside one transaction.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockbook_core::SequenceKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberRepository;

impl NumberRepository {
    /// Last value issued for `kind` in the branch that starts with `prefix`.
    ///
    /// Values issued under an older prefix are ignored, so a prefix change
    /// restarts the count.
    pub async fn last_issued(
        &self,
        conn: &mut SqliteConnection,
        kind: SequenceKind,
        branch_id: &str,
        prefix: &str,
    ) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value FROM issued_numbers
            WHERE kind = ?1 AND branch_id = ?2 AND substr(value, 1, length(?3)) = ?3
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(kind)
        .bind(branch_id)
        .bind(prefix)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(value)
    }

    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        kind: SequenceKind,
        branch_id: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issued_numbers (kind, branch_id, value, issued_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(kind)
        .bind(branch_id)
        .bind(value)
        .bind(now.timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("document number", value))?;

        debug!(kind = %kind, value = %value, "Document number issued");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_last_issued_filters_by_prefix() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let branch = db.branches().insert(&mut conn, "Main", "MAIN").await.unwrap();
        let numbers = db.numbers();

        assert!(numbers
            .last_issued(&mut conn, SequenceKind::Receipt, &branch.id, "RCP-MAIN-")
            .await
            .unwrap()
            .is_none());

        for value in ["RCP-MAIN-000001", "RCP-MAIN-000002", "SALE-MAIN-000009"] {
            numbers
                .record(&mut conn, SequenceKind::Receipt, &branch.id, value, Utc::now())
                .await
                .unwrap();
        }

        let last = numbers
            .last_issued(&mut conn, SequenceKind::Receipt, &branch.id, "RCP-MAIN-")
            .await
            .unwrap();
        assert_eq!(last.as_deref(), Some("RCP-MAIN-000002"));

        let err = numbers
            .record(&mut conn, SequenceKind::Receipt, &branch.id, "RCP-MAIN-000002", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
