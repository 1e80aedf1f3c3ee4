//! # Engine
//!
//! The handle every operation hangs off, plus the steps those operations
//! share: loading aggregates, issuing numbers, committing a stock movement
//! and posting to an account ledger.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. request.validate()            nothing locked, nothing read         │
//! │  2. locks.acquire(keys)           sorted, per product@branch / account │
//! │  3. db.begin()                    one SQLite transaction               │
//! │  4. load ─► core rules ─► write   repositories share &mut tx          │
//! │  5. tx.commit()                   all or nothing                       │
//! │  6. locks dropped                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A replay failure rolls the unit back like any other error, then flags
//! the account in a transaction of its own so later writes are refused
//! until [`Engine::reconcile_account`] succeeds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, error, info, warn};

use stockbook_core::account_ledger::{is_backdated, replay};
use stockbook_core::sequence::branch_prefix;
use stockbook_core::stock_ledger::NewStockEntry;
use stockbook_core::{
    Account, AccountLedgerEntry, ActionKind, Branch, CoreError, EntryFields, Money,
    MovementContext, Particular, Product, SequenceGenerator, SequenceKind, StockLedgerEntry,
    VariantDelta, VariantSet,
};
use stockbook_db::{Database, NewAccountEntry};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorCode};
use crate::locks::LockRegistry;

/// Where and why stock moved, shared by every line of one movement.
#[derive(Debug, Clone)]
pub(crate) struct Movement<'a> {
    pub particular: Particular,
    pub ref_no: &'a str,
    pub date: DateTime<Utc>,
    pub context: MovementContext,
}

/// Multi-branch inventory and ledger engine.
///
/// ## Example
/// ```rust,ignore
/// let engine = Engine::open(EngineConfig::load(None)?).await?;
/// let sale = engine
///     .sell(SaleRequest::new(&branch.id).line("Biscuits", "CARTON", qty, price))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) db: Database,
    pub(crate) locks: LockRegistry,
    pub(crate) generator: SequenceGenerator,
    pub(crate) config: EngineConfig,
}

impl Engine {
    /// Opens the configured database, running migrations.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Self::with_database(db, config)
    }

    /// Wraps an already opened database.
    pub fn with_database(db: Database, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let generator = SequenceGenerator::new(config.numbering.width)?;
        let locks = LockRegistry::new(config.lock_timeout());

        info!(
            lock_timeout_ms = config.locking.lock_timeout_ms,
            number_width = config.numbering.width,
            "Engine ready"
        );

        Ok(Engine {
            db,
            locks,
            generator,
            config,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Loading
    // =========================================================================

    pub(crate) async fn load_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> EngineResult<Branch> {
        self.db
            .branches()
            .find_by_id(conn, branch_id)
            .await?
            .ok_or_else(|| CoreError::BranchNotFound(branch_id.to_string()).into())
    }

    pub(crate) async fn load_product(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        name: &str,
    ) -> EngineResult<Product> {
        self.db
            .products()
            .find_by_name(conn, branch_id, name)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(name.trim().to_string()).into())
    }

    pub(crate) async fn load_product_by_id(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> EngineResult<Product> {
        self.db
            .products()
            .find_by_id(conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    pub(crate) async fn load_account(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> EngineResult<Account> {
        self.db
            .accounts()
            .find_by_id(conn, account_id)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()).into())
    }

    // =========================================================================
    // Numbering
    // =========================================================================

    /// Next number of `kind` for the branch, recorded in the same transaction.
    pub(crate) async fn issue_number(
        &self,
        conn: &mut SqliteConnection,
        kind: SequenceKind,
        branch: &Branch,
    ) -> EngineResult<String> {
        let prefix = branch_prefix(self.config.numbering.prefixes.for_kind(kind), &branch.code);
        let numbers = self.db.numbers();

        let last = numbers.last_issued(conn, kind, &branch.id, &prefix).await?;
        let value = self.generator.next(&prefix, last.as_deref())?;
        numbers.record(conn, kind, &branch.id, &value, Utc::now()).await?;

        Ok(value)
    }

    /// The caller's reference, trimmed, or a freshly issued one.
    pub(crate) async fn resolve_ref(
        &self,
        conn: &mut SqliteConnection,
        kind: SequenceKind,
        branch: &Branch,
        given: Option<&str>,
    ) -> EngineResult<String> {
        match given {
            Some(ref_no) => Ok(stockbook_core::validation::validate_ref_no(ref_no)?),
            None => self.issue_number(conn, kind, branch).await,
        }
    }

    // =========================================================================
    // Stock Movements
    // =========================================================================

    /// Fails when `ref_no` already moved this product for `particular`.
    pub(crate) async fn ensure_unrecorded(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
        particular: Particular,
        ref_no: &str,
    ) -> EngineResult<()> {
        if particular.is_correction() {
            return Ok(());
        }
        let recorded = self
            .db
            .stock_ledger()
            .exists(conn, &product.id, &product.branch_id, particular, ref_no)
            .await?;
        if recorded {
            warn!(product = %product.name, %ref_no, particular = particular.as_str(), "Movement already recorded");
            return Err(CoreError::DuplicateReference {
                scope: format!("{} of {}", particular.as_str(), product.name),
                ref_no: ref_no.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Appends the ledger entry describing `after` and `deltas`.
    pub(crate) async fn record_movement(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        after: &VariantSet,
        deltas: &[VariantDelta],
        movement: &Movement<'_>,
    ) -> EngineResult<StockLedgerEntry> {
        let entry = NewStockEntry::record(
            product_id,
            branch_id,
            after,
            movement.particular,
            movement.ref_no,
            movement.date,
            deltas,
            movement.context.clone(),
        )?;
        Ok(self.db.stock_ledger().append(conn, &entry).await?)
    }

    /// Persists the new variant quantities and their ledger entry together.
    pub(crate) async fn commit_movement(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
        after: &VariantSet,
        deltas: &[VariantDelta],
        movement: &Movement<'_>,
    ) -> EngineResult<StockLedgerEntry> {
        self.db
            .products()
            .update_variants(conn, product, after, Utc::now())
            .await?;
        self.record_movement(conn, &product.id, &product.branch_id, after, deltas, movement)
            .await
    }

    // =========================================================================
    // Account Ledger
    // =========================================================================

    pub(crate) fn ensure_reconciled(account: &Account) -> EngineResult<()> {
        if account.reconcile_required {
            return Err(CoreError::replay_failure(
                &account.id,
                "account is awaiting reconciliation",
            )
            .into());
        }
        Ok(())
    }

    /// Appends one entry and brings `account.current_balance` up to date.
    ///
    /// The caller saves the account. A retried append with identical fields
    /// returns the stored entry unchanged.
    pub(crate) async fn post_entry(
        &self,
        conn: &mut SqliteConnection,
        account: &mut Account,
        branch_id: &str,
        ref_no: &str,
        fields: EntryFields,
    ) -> EngineResult<AccountLedgerEntry> {
        Self::ensure_reconciled(account)?;
        fields.validate(account.kind)?;

        let ledger = self.db.account_ledger();
        if let Some(existing) = ledger.find_by_ref(conn, &account.id, ref_no).await? {
            if existing.same_movement(branch_id, &fields) {
                debug!(account_id = %account.id, %ref_no, "Entry already posted");
                return Ok(existing);
            }
            return Err(CoreError::DuplicateReference {
                scope: format!("account {}", account.name),
                ref_no: ref_no.to_string(),
            }
            .into());
        }

        let last = ledger.last(conn, &account.id).await?;
        if is_backdated(last.as_ref(), fields.date) {
            debug!(account_id = %account.id, %ref_no, "Back-dated entry, replaying account");
            let placeholder = NewAccountEntry {
                account_id: account.id.clone(),
                branch_id: branch_id.to_string(),
                ref_no: ref_no.to_string(),
                fields,
                balance: Money::zero(),
            };
            ledger.append(conn, &placeholder).await?;
            account.current_balance = self.replay_account(conn, account).await?;

            return ledger
                .find_by_ref(conn, &account.id, ref_no)
                .await?
                .ok_or_else(|| EngineError::internal("posted entry vanished during replay"));
        }

        let prior = last.map(|l| l.balance).unwrap_or_else(Money::zero);
        let balance = account
            .kind
            .direction()
            .apply(prior, fields.amount, fields.paid)?;
        let entry = ledger
            .append(
                conn,
                &NewAccountEntry {
                    account_id: account.id.clone(),
                    branch_id: branch_id.to_string(),
                    ref_no: ref_no.to_string(),
                    fields,
                    balance,
                },
            )
            .await?;
        account.current_balance = balance;

        Ok(entry)
    }

    /// Recomputes every stored balance of the account; returns the final one.
    pub(crate) async fn replay_account(
        &self,
        conn: &mut SqliteConnection,
        account: &Account,
    ) -> EngineResult<Money> {
        let ledger = self.db.account_ledger();
        let entries = ledger.all_for_account(conn, &account.id).await?;
        let replayed = replay(&account.id, account.kind.direction(), entries)?;

        let changed: Vec<(String, Money)> = replayed
            .entries
            .iter()
            .filter(|e| replayed.changed.contains(&e.id))
            .map(|e| (e.id.clone(), e.balance))
            .collect();
        ledger.update_balances(conn, &changed).await?;

        debug!(
            account_id = %account.id,
            entries = replayed.entries.len(),
            changed = changed.len(),
            balance = %replayed.balance,
            "Account replayed"
        );
        Ok(replayed.balance)
    }

    /// Flags the account when `result` is a replay failure.
    ///
    /// Must run after the failed transaction has been dropped.
    pub(crate) async fn quarantine_on_replay_failure<T>(
        &self,
        account_id: &str,
        result: EngineResult<T>,
    ) -> EngineResult<T> {
        if let Err(err) = &result {
            if err.code == ErrorCode::LedgerReplayFailure {
                self.flag_for_reconciliation(account_id, &err.message).await;
            }
        }
        result
    }

    async fn flag_for_reconciliation(&self, account_id: &str, reason: &str) {
        let flagged = async {
            let mut tx = self.db.begin().await?;
            self.db
                .accounts()
                .set_reconcile_required(&mut tx, account_id, true)
                .await?;
            tx.commit().await?;
            Ok::<(), EngineError>(())
        }
        .await;

        match flagged {
            Ok(()) => error!(%account_id, %reason, "Account ledger replay failed, reconciliation required"),
            Err(e) => error!(%account_id, %reason, error = %e, "Could not flag account for reconciliation"),
        }
    }

    // =========================================================================
    // Action Log
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn log_action(
        &self,
        conn: &mut SqliteConnection,
        action: ActionKind,
        subject: &str,
        before: Option<String>,
        after: Option<String>,
        operator: Option<&str>,
    ) -> EngineResult<()> {
        self.db
            .action_log()
            .record(conn, action, subject, before, after, operator, Utc::now())
            .await?;
        Ok(())
    }
}

/// JSON snapshot for the action log.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> EngineResult<String> {
    serde_json::to_string(value)
        .map_err(|e| EngineError::internal(format!("cannot serialize snapshot: {}", e)))
}
