//! # Account Ledger
//!
//! Running-balance ledgers for customers and suppliers.
//!
//! ## The Fold
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  entries ordered by (date, seq)                                         │
//! │                                                                         │
//! │  #  type           amount   paid    effect    balance                   │
//! │  ─  ────────────   ──────   ────    ──────    ───────                   │
//! │  1  credit_sales    100.00   0.00   -100.00   -100.00                   │
//! │  2  credit_sales     50.00   0.00    -50.00   -150.00                   │
//! │  3  payment           0.00  80.00    +80.00    -70.00                   │
//! │                                                                         │
//! │  edit #1 amount → 150.00                                                │
//! │  1                  150.00   0.00   -150.00   -150.00                   │
//! │  2                                            -200.00  ← replayed       │
//! │  3                                            -120.00  ← replayed       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A stored balance is only meaningful as a prefix fold, so any change to
//! an entry (or an insert before the tail) replays the whole account from
//! its first entry. [`replay`] is a pure function of the entry set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Account Kind & Direction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Customer,
    Supplier,
}

impl AccountKind {
    pub fn direction(&self) -> LedgerDirection {
        match self {
            AccountKind::Customer => LedgerDirection::Receivable,
            AccountKind::Supplier => LedgerDirection::Payable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Customer => "customer",
            AccountKind::Supplier => "supplier",
        }
    }
}

/// Sign convention of a ledger. A property of the ledger, not of entries.
///
/// - `Receivable` (customers): what they owe us is negative.
///   `effect = paid - amount`
/// - `Payable` (suppliers): what we owe them is positive.
///   `effect = amount - paid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerDirection {
    Receivable,
    Payable,
}

impl LedgerDirection {
    pub fn effect(&self, amount: Money, paid: Money) -> CoreResult<Money> {
        let (plus, minus) = match self {
            LedgerDirection::Receivable => (paid, amount),
            LedgerDirection::Payable => (amount, paid),
        };
        plus.checked_sub(minus)
            .ok_or_else(|| CoreError::Overflow("ledger effect".to_string()))
    }

    /// `prior + effect(amount, paid)`.
    pub fn apply(&self, prior: Money, amount: Money, paid: Money) -> CoreResult<Money> {
        prior
            .checked_add(self.effect(amount, paid)?)
            .ok_or_else(|| CoreError::Overflow("running balance".to_string()))
    }
}

// =============================================================================
// Entry Type & Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Sale on credit; `paid` may be a partial down payment.
    CreditSales,
    /// Fully paid sale; nets to zero on the balance.
    PaidSales,
    /// Customer settles debt.
    Payment,
    /// Goods received from a supplier.
    SupplierDebit,
    /// We pay a supplier.
    SupplierCredit,
}

impl EntryType {
    pub fn kind(&self) -> AccountKind {
        match self {
            EntryType::CreditSales | EntryType::PaidSales | EntryType::Payment => {
                AccountKind::Customer
            }
            EntryType::SupplierDebit | EntryType::SupplierCredit => AccountKind::Supplier,
        }
    }

    /// Settlements carry no amount, only `paid`.
    pub fn is_settlement(&self) -> bool {
        matches!(self, EntryType::Payment | EntryType::SupplierCredit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::CreditSales => "credit_sales",
            EntryType::PaidSales => "paid_sales",
            EntryType::Payment => "payment",
            EntryType::SupplierDebit => "supplier_debit",
            EntryType::SupplierCredit => "supplier_credit",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Normal,
    Edited,
}

// =============================================================================
// Entries
// =============================================================================

/// The mutable business fields of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EntryFields {
    pub entry_type: EntryType,
    pub amount: Money,
    pub paid: Money,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

impl EntryFields {
    /// Checks the fields against the ledger they are written to.
    ///
    /// ```rust
    /// use chrono::Utc;
    /// use stockbook_core::account_ledger::{AccountKind, EntryFields, EntryType};
    /// use stockbook_core::Money;
    ///
    /// let payment = EntryFields {
    ///     entry_type: EntryType::Payment,
    ///     amount: Money::zero(),
    ///     paid: Money::from_major(200),
    ///     date: Utc::now(),
    /// };
    /// assert!(payment.validate(AccountKind::Customer).is_ok());
    /// assert!(payment.validate(AccountKind::Supplier).is_err());
    /// ```
    pub fn validate(&self, kind: AccountKind) -> Result<(), ValidationError> {
        if self.entry_type.kind() != kind {
            return Err(ValidationError::NotAllowed {
                field: "entry_type".to_string(),
                allowed: allowed_types(kind),
            });
        }
        if self.amount.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "amount".to_string(),
            });
        }
        if self.paid.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "paid".to_string(),
            });
        }

        if self.entry_type.is_settlement() {
            if !self.amount.is_zero() {
                return Err(ValidationError::InvalidFormat {
                    field: "amount".to_string(),
                    reason: format!("{} entries carry only a paid value", self.entry_type),
                });
            }
            if !self.paid.is_positive() {
                return Err(ValidationError::positive("paid"));
            }
        } else if !self.amount.is_positive() {
            return Err(ValidationError::positive("amount"));
        }

        Ok(())
    }
}

fn allowed_types(kind: AccountKind) -> Vec<String> {
    let types: &[EntryType] = match kind {
        AccountKind::Customer => &[EntryType::CreditSales, EntryType::PaidSales, EntryType::Payment],
        AccountKind::Supplier => &[EntryType::SupplierDebit, EntryType::SupplierCredit],
    };
    types.iter().map(|t| t.as_str().to_string()).collect()
}

/// A stored account ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountLedgerEntry {
    pub id: String,
    /// Creation order; breaks ties between entries on the same date.
    pub seq: i64,
    pub account_id: String,
    pub branch_id: String,
    pub ref_no: String,
    pub entry_type: EntryType,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub amount: Money,
    pub paid: Money,
    /// Running balance after this entry.
    pub balance: Money,
    pub status: EntryStatus,
}

impl AccountLedgerEntry {
    pub fn fields(&self) -> EntryFields {
        EntryFields {
            entry_type: self.entry_type,
            amount: self.amount,
            paid: self.paid,
            date: self.date,
        }
    }

    /// True when `fields` describe this very movement (a retried append).
    pub fn same_movement(&self, branch_id: &str, fields: &EntryFields) -> bool {
        self.branch_id == branch_id && self.fields() == *fields
    }
}

/// An append only needs the prior balance if it lands at the tail.
///
/// Returns true when `date` sorts before the current last entry, in which
/// case the account must be replayed instead.
pub fn is_backdated(last: Option<&AccountLedgerEntry>, date: DateTime<Utc>) -> bool {
    last.map(|l| date < l.date).unwrap_or(false)
}

// =============================================================================
// Replay
// =============================================================================

/// Result of replaying one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// All entries in `(date, seq)` order with recomputed balances.
    pub entries: Vec<AccountLedgerEntry>,
    /// Ids of entries whose stored balance changed.
    pub changed: Vec<String>,
    /// Balance of the last entry, zero for an empty ledger.
    pub balance: Money,
}

/// Recomputes every running balance of one account from the start.
///
/// Fails with `LedgerReplayFailure` when the entry set cannot be ordered
/// unambiguously (entries of another account, repeated `seq`) or a balance
/// overflows. A failed replay must never be half-applied.
pub fn replay(
    account_id: &str,
    direction: LedgerDirection,
    mut entries: Vec<AccountLedgerEntry>,
) -> CoreResult<Replay> {
    if let Some(stray) = entries.iter().find(|e| e.account_id != account_id) {
        return Err(CoreError::replay_failure(
            account_id,
            format!("entry {} belongs to account {}", stray.ref_no, stray.account_id),
        ));
    }

    entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.seq.cmp(&b.seq)));

    let mut seqs: Vec<i64> = entries.iter().map(|e| e.seq).collect();
    seqs.sort_unstable();
    if let Some(pair) = seqs.windows(2).find(|w| w[0] == w[1]) {
        return Err(CoreError::replay_failure(
            account_id,
            format!("creation sequence {} appears more than once", pair[0]),
        ));
    }

    let mut balance = Money::zero();
    let mut changed = Vec::new();
    for entry in entries.iter_mut() {
        balance = direction
            .apply(balance, entry.amount, entry.paid)
            .map_err(|e| CoreError::replay_failure(account_id, e.to_string()))?;
        if entry.balance != balance {
            entry.balance = balance;
            changed.push(entry.id.clone());
        }
    }

    Ok(Replay {
        entries,
        changed,
        balance,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
