//! # Branch Repository
//!
//! Branches are looked up for their document-number code and their
//! negative-stock setting. Management CRUD beyond that lives elsewhere.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use stockbook_core::validation::validate_branch_code;
use stockbook_core::Branch;

#[derive(Debug, Clone, Copy, Default)]
pub struct BranchRepository;

impl BranchRepository {
    /// Inserts a branch. The code is validated and upper-cased.
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        code: &str,
    ) -> DbResult<Branch> {
        let code = validate_branch_code(code)
            .map_err(|e| DbError::QueryFailed(e.to_string()))?;
        let branch = Branch {
            id: new_id(),
            name: name.trim().to_string(),
            code,
            allow_negative_stock: false,
        };

        debug!(id = %branch.id, code = %branch.code, "Inserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, name, code, allow_negative_stock, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(&branch.code)
        .bind(branch.allow_negative_stock)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("branch code", &branch.code))?;

        Ok(branch)
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, name, code, allow_negative_stock FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(branch)
    }

    /// Like [`BranchRepository::find_by_id`] but a missing row is an error.
    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Branch> {
        self.find_by_id(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Branch", id))
    }

    pub async fn list(&self, conn: &mut SqliteConnection) -> DbResult<Vec<Branch>> {
        let branches = sqlx::query_as::<_, Branch>(
            "SELECT id, name, code, allow_negative_stock FROM branches ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(branches)
    }

    /// Flips the branch-level "allow negative stock" override.
    pub async fn set_allow_negative_stock(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        allow: bool,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE branches SET allow_negative_stock = ?1 WHERE id = ?2")
            .bind(allow)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Branch", id));
        }

        info!(branch_id = %id, allow, "Negative stock setting changed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
