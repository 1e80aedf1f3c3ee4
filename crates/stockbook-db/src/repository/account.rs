//! # Account Repositories
//!
//! Customers and suppliers ([`AccountRepository`]) and their running-balance
//! entries ([`AccountLedgerRepository`]).
//!
//! ## Balance Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where Balances Live                                  │
//! │                                                                         │
//! │  account_ledger.balance_cents   running total after each entry         │
//! │       │                                                                 │
//! │       │  chronologically last entry (date_ms DESC, seq DESC)           │
//! │       ▼                                                                 │
//! │  accounts.current_balance_cents cached copy for fast reads             │
//! │                                                                         │
//! │  Both are rewritten by the engine inside one transaction; this module  │
//! │  never derives a balance itself.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{from_millis, new_id};
use stockbook_core::{
    Account, AccountKind, AccountLedgerEntry, DateRange, EntryFields, EntryStatus, EntryType, Money,
};

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    kind: AccountKind,
    branch_id: String,
    name: String,
    phone: Option<String>,
    current_balance_cents: i64,
    reconcile_required: bool,
    cash_sales_count: i64,
    credit_sales_count: i64,
    sales_amount_cents: i64,
    version: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            kind: row.kind,
            branch_id: row.branch_id,
            name: row.name,
            phone: row.phone,
            current_balance: Money::from_cents(row.current_balance_cents),
            reconcile_required: row.reconcile_required,
            cash_sales_count: row.cash_sales_count,
            credit_sales_count: row.credit_sales_count,
            sales_amount: Money::from_cents(row.sales_amount_cents),
            version: row.version,
        }
    }
}

const SELECT_ACCOUNT: &str = r#"
    SELECT id, kind, branch_id, name, phone, current_balance_cents,
           reconcile_required, cash_sales_count, credit_sales_count,
           sales_amount_cents, version
    FROM accounts
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountRepository;

impl AccountRepository {
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        kind: AccountKind,
        branch_id: &str,
        name: &str,
        phone: Option<&str>,
    ) -> DbResult<Account> {
        let account = Account {
            id: new_id(),
            kind,
            branch_id: branch_id.to_string(),
            name: name.trim().to_string(),
            phone: phone.map(|p| p.trim().to_string()),
            current_balance: Money::zero(),
            reconcile_required: false,
            cash_sales_count: 0,
            credit_sales_count: 0,
            sales_amount: Money::zero(),
            version: 1,
        };

        debug!(id = %account.id, kind = kind.as_str(), "Inserting account");

        sqlx::query(
            r#"
            INSERT INTO accounts (id, kind, branch_id, name, phone, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(account.kind)
        .bind(&account.branch_id)
        .bind(&account.name)
        .bind(&account.phone)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(account)
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("{SELECT_ACCOUNT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(Account::from))
    }

    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        kind: AccountKind,
    ) -> DbResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "{SELECT_ACCOUNT} WHERE branch_id = ?1 AND kind = ?2 ORDER BY name"
        ))
        .bind(branch_id)
        .bind(kind)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Writes the cached balance and sales aggregates of `account`.
    ///
    /// Checked against `account.version`; a stale copy fails with
    /// [`DbError::Conflict`]. Returns the new version.
    pub async fn save_state(&self, conn: &mut SqliteConnection, account: &Account) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET current_balance_cents = ?1, cash_sales_count = ?2,
                credit_sales_count = ?3, sales_amount_cents = ?4,
                version = version + 1
            WHERE id = ?5 AND version = ?6
            "#,
        )
        .bind(account.current_balance.cents())
        .bind(account.cash_sales_count)
        .bind(account.credit_sales_count)
        .bind(account.sales_amount.cents())
        .bind(&account.id)
        .bind(account.version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            warn!(account_id = %account.id, version = account.version, "Account changed since it was read");
            return Err(DbError::conflict("account", &account.id));
        }

        Ok(account.version + 1)
    }

    /// Sets or clears the flag that blocks mutation until reconciliation.
    pub async fn set_reconcile_required(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        required: bool,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET reconcile_required = ?1, version = version + 1 WHERE id = ?2",
        )
        .bind(required)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account", id));
        }
        Ok(())
    }
}

// =============================================================================
// Account Ledger
// =============================================================================

/// An entry about to be appended, with its balance already computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountEntry {
    pub account_id: String,
    pub branch_id: String,
    pub ref_no: String,
    pub fields: EntryFields,
    pub balance: Money,
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    seq: i64,
    id: String,
    account_id: String,
    branch_id: String,
    ref_no: String,
    entry_type: EntryType,
    date_ms: i64,
    amount_cents: i64,
    paid_cents: i64,
    balance_cents: i64,
    status: EntryStatus,
}

impl LedgerRow {
    fn into_entry(self) -> DbResult<AccountLedgerEntry> {
        Ok(AccountLedgerEntry {
            date: from_millis(self.date_ms, "account ledger entry", &self.id)?,
            id: self.id,
            seq: self.seq,
            account_id: self.account_id,
            branch_id: self.branch_id,
            ref_no: self.ref_no,
            entry_type: self.entry_type,
            amount: Money::from_cents(self.amount_cents),
            paid: Money::from_cents(self.paid_cents),
            balance: Money::from_cents(self.balance_cents),
            status: self.status,
        })
    }
}

const SELECT_LEDGER: &str = r#"
    SELECT seq, id, account_id, branch_id, ref_no, entry_type, date_ms,
           amount_cents, paid_cents, balance_cents, status
    FROM account_ledger
"#;

/// Running-balance entries of customer and supplier accounts.
///
/// Unlike the stock ledger, entries here are edited and deleted in
/// place; the engine replays every balance afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLedgerRepository;

impl AccountLedgerRepository {
    /// Appends an entry. A reused `(account, ref_no)` fails with
    /// [`DbError::UniqueViolation`].
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewAccountEntry,
    ) -> DbResult<AccountLedgerEntry> {
        let id = new_id();

        let result = sqlx::query(
            r#"
            INSERT INTO account_ledger (
                id, account_id, branch_id, ref_no, entry_type, date_ms,
                amount_cents, paid_cents, balance_cents, status, created_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&id)
        .bind(&entry.account_id)
        .bind(&entry.branch_id)
        .bind(&entry.ref_no)
        .bind(entry.fields.entry_type)
        .bind(entry.fields.date.timestamp_millis())
        .bind(entry.fields.amount.cents())
        .bind(entry.fields.paid.cents())
        .bind(entry.balance.cents())
        .bind(EntryStatus::Normal)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("account reference", &entry.ref_no))?;

        let seq = result.last_insert_rowid();
        debug!(
            seq,
            account_id = %entry.account_id,
            ref_no = %entry.ref_no,
            entry_type = %entry.fields.entry_type,
            balance = %entry.balance,
            "Account ledger entry appended"
        );

        Ok(AccountLedgerEntry {
            id,
            seq,
            account_id: entry.account_id.clone(),
            branch_id: entry.branch_id.clone(),
            ref_no: entry.ref_no.clone(),
            entry_type: entry.fields.entry_type,
            date: from_millis(entry.fields.date.timestamp_millis(), "account ledger entry", &entry.ref_no)?,
            amount: entry.fields.amount,
            paid: entry.fields.paid,
            balance: entry.balance,
            status: EntryStatus::Normal,
        })
    }

    pub async fn find_by_ref(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        ref_no: &str,
    ) -> DbResult<Option<AccountLedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "{SELECT_LEDGER} WHERE account_id = ?1 AND ref_no = ?2"
        ))
        .bind(account_id)
        .bind(ref_no)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(LedgerRow::into_entry).transpose()
    }

    /// The chronologically last entry: latest date, then latest creation.
    pub async fn last(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> DbResult<Option<AccountLedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "{SELECT_LEDGER} WHERE account_id = ?1 ORDER BY date_ms DESC, seq DESC LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(LedgerRow::into_entry).transpose()
    }

    /// Every entry of the account in replay order.
    pub async fn all_for_account(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> DbResult<Vec<AccountLedgerEntry>> {
        self.list(conn, account_id, DateRange::all()).await
    }

    /// Entries within `range`, ascending by date then creation order.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        range: DateRange,
    ) -> DbResult<Vec<AccountLedgerEntry>> {
        let (from_ms, to_ms) = range.millis();
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"{SELECT_LEDGER}
            WHERE account_id = ?1 AND date_ms >= ?2 AND date_ms <= ?3
            ORDER BY date_ms ASC, seq ASC"#
        ))
        .bind(account_id)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }

    /// Overwrites the movement fields of one entry. The stored balance is
    /// left stale for the caller's replay to fix.
    pub async fn update_fields(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        fields: &EntryFields,
        status: EntryStatus,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE account_ledger
            SET entry_type = ?1, date_ms = ?2, amount_cents = ?3, paid_cents = ?4, status = ?5
            WHERE id = ?6
            "#,
        )
        .bind(fields.entry_type)
        .bind(fields.date.timestamp_millis())
        .bind(fields.amount.cents())
        .bind(fields.paid.cents())
        .bind(status)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account ledger entry", id));
        }
        Ok(())
    }

    /// Rewrites the running balance of each `(entry id, balance)` pair.
    pub async fn update_balances(
        &self,
        conn: &mut SqliteConnection,
        balances: &[(String, Money)],
    ) -> DbResult<()> {
        for (id, balance) in balances {
            let result = sqlx::query("UPDATE account_ledger SET balance_cents = ?1 WHERE id = ?2")
                .bind(balance.cents())
                .bind(id)
                .execute(&mut *conn)
                .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Account ledger entry", id));
            }
        }

        debug!(count = balances.len(), "Running balances rewritten");
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM account_ledger WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account ledger entry", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
