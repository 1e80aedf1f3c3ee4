//! # Action Log Repository
//!
//! Audit trail of corrections: ledger entry edits and deletes, transfer
//! edits and deletes, reconciliations and negative-stock toggles.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{from_millis, new_id};
use stockbook_core::{ActionKind, ActionLogEntry};

#[derive(Debug, FromRow)]
struct ActionRow {
    id: String,
    action: ActionKind,
    subject: String,
    before_json: Option<String>,
    after_json: Option<String>,
    operator: Option<String>,
    created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionLogRepository;

impl ActionLogRepository {
    /// Records one action. `before`/`after` are JSON snapshots.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        action: ActionKind,
        subject: &str,
        before: Option<String>,
        after: Option<String>,
        operator: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<ActionLogEntry> {
        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO action_log (id, action, subject, before_json, after_json, operator, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(action)
        .bind(subject)
        .bind(&before)
        .bind(&after)
        .bind(operator)
        .bind(now.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        debug!(id = %id, ?action, subject = %subject, "Action logged");

        Ok(ActionLogEntry {
            created_at: from_millis(now.timestamp_millis(), "action log entry", &id)?,
            id,
            action,
            subject: subject.to_string(),
            before,
            after,
            operator: operator.map(str::to_string),
        })
    }

    /// Actions recorded against one subject, oldest first.
    pub async fn list_for_subject(
        &self,
        conn: &mut SqliteConnection,
        subject: &str,
    ) -> DbResult<Vec<ActionLogEntry>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, action, subject, before_json, after_json, operator, created_at_ms
            FROM action_log
            WHERE subject = ?1
            ORDER BY created_at_ms, rowid
            "#,
        )
        .bind(subject)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ActionLogEntry {
                    created_at: from_millis(row.created_at_ms, "action log entry", &row.id)?,
                    id: row.id,
                    action: row.action,
                    subject: row.subject,
                    before: row.before_json,
                    after: row.after_json,
                    operator: row.operator,
                })
            })
            .collect()
    }
}
