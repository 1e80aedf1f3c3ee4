//! # Account Ledgers
//!
//! Payments, corrections and reconciliation of customer and supplier
//! ledgers. Every correction replays the whole account so that running
//! balances after the touched entry follow the new history.
//!
//! ## Replay Failure
//! ```text
//! edit / delete / back-dated append
//!      │
//!      ▼
//! replay(account) ──── ok ────► balances rewritten, tx committed
//!      │
//!      ▼ overflow or ambiguous order
//! tx rolled back ──► account.reconcile_required = true
//!      │
//!      ▼
//! every later write fails with LedgerReplayFailure
//!      │
//!      ▼
//! reconcile_account() ──► replay from stored entries, flag cleared
//! ```

use sqlx::SqliteConnection;
use tracing::{info, warn};

use stockbook_core::{
    AccountKind, AccountLedgerEntry, ActionKind, CoreError, EntryFields, EntryStatus, EntryType,
    Money, SequenceKind,
};

use crate::engine::{snapshot, Engine};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::{EditEntryRequest, PaymentRequest};

impl Engine {
    /// Records money received from a customer or paid to a supplier.
    ///
    /// Without a reference the next payment number of the branch is used.
    pub async fn record_payment(&self, request: PaymentRequest) -> EngineResult<AccountLedgerEntry> {
        request.validate()?;

        let _locks = self
            .locks
            .acquire([LockKey::account(&request.account_id)])
            .await?;
        let result = self.record_payment_locked(&request).await;
        self.quarantine_on_replay_failure(&request.account_id, result)
            .await
    }

    async fn record_payment_locked(&self, request: &PaymentRequest) -> EngineResult<AccountLedgerEntry> {
        let mut tx = self.db.begin().await?;

        let mut account = self.load_account(&mut tx, &request.account_id).await?;
        Self::ensure_reconciled(&account)?;
        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let ref_no = self
            .resolve_ref(&mut tx, SequenceKind::Payment, &branch, request.ref_no.as_deref())
            .await?;

        let entry_type = match account.kind {
            AccountKind::Customer => EntryType::Payment,
            AccountKind::Supplier => EntryType::SupplierCredit,
        };
        let fields = EntryFields {
            entry_type,
            amount: Money::zero(),
            paid: request.amount,
            date: request.date,
        };
        let entry = self
            .post_entry(&mut tx, &mut account, &branch.id, &ref_no, fields)
            .await?;
        self.db.accounts().save_state(&mut tx, &account).await?;

        tx.commit().await?;

        info!(
            account_id = %account.id,
            %ref_no,
            amount = %request.amount,
            balance = %account.current_balance,
            "Payment recorded"
        );
        Ok(entry)
    }

    /// Replaces the fields of one entry and replays the account.
    pub async fn edit_ledger_entry(&self, request: EditEntryRequest) -> EngineResult<AccountLedgerEntry> {
        request.validate()?;

        let _locks = self
            .locks
            .acquire([LockKey::account(&request.account_id)])
            .await?;
        let result = self.edit_ledger_entry_locked(&request).await;
        self.quarantine_on_replay_failure(&request.account_id, result)
            .await
    }

    async fn edit_ledger_entry_locked(&self, request: &EditEntryRequest) -> EngineResult<AccountLedgerEntry> {
        let mut tx = self.db.begin().await?;

        let mut account = self.load_account(&mut tx, &request.account_id).await?;
        Self::ensure_reconciled(&account)?;
        request.fields.validate(account.kind)?;

        let ledger = self.db.account_ledger();
        let before = self
            .find_entry(&mut tx, &account.id, &request.ref_no)
            .await?;
        ledger
            .update_fields(&mut tx, &before.id, &request.fields, EntryStatus::Edited)
            .await?;
        account.current_balance = self.replay_account(&mut tx, &account).await?;
        self.db.accounts().save_state(&mut tx, &account).await?;

        let after = self
            .find_entry(&mut tx, &account.id, &request.ref_no)
            .await?;
        self.log_action(
            &mut tx,
            ActionKind::LedgerEntryEdited,
            &account.id,
            Some(snapshot(&before)?),
            Some(snapshot(&after)?),
            request.operator.as_deref(),
        )
        .await?;

        tx.commit().await?;

        info!(
            account_id = %account.id,
            ref_no = %request.ref_no,
            balance = %account.current_balance,
            "Ledger entry edited"
        );
        Ok(after)
    }

    /// Removes one entry and replays the account. Returns the new balance.
    pub async fn delete_ledger_entry(
        &self,
        account_id: &str,
        ref_no: &str,
        operator: Option<&str>,
    ) -> EngineResult<Money> {
        let _locks = self.locks.acquire([LockKey::account(account_id)]).await?;
        let result = self
            .delete_ledger_entry_locked(account_id, ref_no, operator)
            .await;
        self.quarantine_on_replay_failure(account_id, result).await
    }

    async fn delete_ledger_entry_locked(
        &self,
        account_id: &str,
        ref_no: &str,
        operator: Option<&str>,
    ) -> EngineResult<Money> {
        let mut tx = self.db.begin().await?;

        let mut account = self.load_account(&mut tx, account_id).await?;
        Self::ensure_reconciled(&account)?;

        let entry = self.find_entry(&mut tx, &account.id, ref_no).await?;
        self.db.account_ledger().delete(&mut tx, &entry.id).await?;
        account.current_balance = self.replay_account(&mut tx, &account).await?;
        self.db.accounts().save_state(&mut tx, &account).await?;

        self.log_action(
            &mut tx,
            ActionKind::LedgerEntryDeleted,
            &account.id,
            Some(snapshot(&entry)?),
            None,
            operator,
        )
        .await?;

        tx.commit().await?;

        info!(%account_id, %ref_no, balance = %account.current_balance, "Ledger entry deleted");
        Ok(account.current_balance)
    }

    /// Rebuilds every running balance from the stored entries and clears
    /// the reconciliation flag.
    ///
    /// Works on flagged accounts; it is the only write that does. Fails
    /// (leaving the flag set) when the stored entries still cannot be
    /// replayed.
    pub async fn reconcile_account(&self, account_id: &str, operator: Option<&str>) -> EngineResult<Money> {
        let _locks = self.locks.acquire([LockKey::account(account_id)]).await?;
        let mut tx = self.db.begin().await?;

        let mut account = self.load_account(&mut tx, account_id).await?;
        let before = account.clone();

        let balance = match self.replay_account(&mut tx, &account).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(%account_id, error = %err, "Reconciliation failed, account stays flagged");
                return Err(err);
            }
        };
        account.current_balance = balance;
        self.db.accounts().save_state(&mut tx, &account).await?;
        self.db
            .accounts()
            .set_reconcile_required(&mut tx, account_id, false)
            .await?;
        account.reconcile_required = false;

        self.log_action(
            &mut tx,
            ActionKind::AccountReconciled,
            account_id,
            Some(snapshot(&before)?),
            Some(snapshot(&account)?),
            operator,
        )
        .await?;

        tx.commit().await?;

        info!(%account_id, %balance, was_flagged = before.reconcile_required, "Account reconciled");
        Ok(balance)
    }

    /// Cached balance of the account's last entry.
    pub async fn current_balance(&self, account_id: &str) -> EngineResult<Money> {
        let mut conn = self.db.acquire().await?;
        let account = self.load_account(&mut conn, account_id).await?;
        Ok(account.current_balance)
    }

    async fn find_entry(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        ref_no: &str,
    ) -> EngineResult<AccountLedgerEntry> {
        self.db
            .account_ledger()
            .find_by_ref(conn, account_id, ref_no.trim())
            .await?
            .ok_or_else(|| {
                CoreError::EntryNotFound {
                    account: account_id.to_string(),
                    ref_no: ref_no.trim().to_string(),
                }
                .into()
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::requests::SaleRequest;
    use crate::testing::*;
    use stockbook_core::{Account, DateRange, Quantity};

    async fn customer(engine: &Engine, branch_id: &str) -> Account {
        engine
            .create_account(AccountKind::Customer, branch_id, "Ayesha", None)
            .await
            .unwrap()
    }

    fn payment(account: &Account, amount: Money, n: i64) -> PaymentRequest {
        PaymentRequest {
            account_id: account.id.clone(),
            branch_id: account.branch_id.clone(),
            amount,
            date: day(n),
            ..Default::default()
        }
    }

    /// Credit sales of 100 and 50 on days 1 and 2, a payment of 80 on day 3.
    async fn three_entries(engine: &Engine, branch_id: &str) -> (Account, String) {
        create_rice(engine, branch_id, 500).await;
        let account = customer(engine, branch_id).await;

        let first = engine
            .sell(
                SaleRequest::new(branch_id)
                    .line("Rice", "KG", Quantity::from_whole(50), Money::from_major(2))
                    .on_credit(&account.id, Money::zero())
                    .dated(day(1)),
            )
            .await
            .unwrap();
        engine
            .sell(
                SaleRequest::new(branch_id)
                    .line("Rice", "KG", Quantity::from_whole(25), Money::from_major(2))
                    .on_credit(&account.id, Money::zero())
                    .dated(day(2)),
            )
            .await
            .unwrap();
        engine
            .record_payment(payment(&account, Money::from_major(80), 3))
            .await
            .unwrap();

        (account, first.receipt_no)
    }

    fn balances(entries: &[AccountLedgerEntry]) -> Vec<Money> {
        entries.iter().map(|e| e.balance).collect()
    }

    #[tokio::test]
    async fn test_running_balance_fold() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, _) = three_entries(&engine, &branch.id).await;

        let history = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(
            balances(&history),
            vec![Money::from_major(-100), Money::from_major(-150), Money::from_major(-70)]
        );
        assert_eq!(history[2].ref_no, "PAY-MAIN-000001");
        assert_eq!(history[2].entry_type, EntryType::Payment);
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(-70));
    }

    #[tokio::test]
    async fn test_credit_sale_then_payment() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        create_rice(&engine, &branch.id, 500).await;
        let account = customer(&engine, &branch.id).await;

        let sale = engine
            .sell(
                SaleRequest::new(&branch.id)
                    .line("Rice", "KG", Quantity::from_whole(250), Money::from_major(2))
                    .on_credit(&account.id, Money::zero())
                    .dated(day(1)),
            )
            .await
            .unwrap();
        assert_eq!(sale.account_entry.unwrap().balance, Money::from_major(-500));

        let paid = engine
            .record_payment(payment(&account, Money::from_major(200), 2))
            .await
            .unwrap();
        assert_eq!(paid.balance, Money::from_major(-300));
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(-300));
    }

    #[tokio::test]
    async fn test_reconcile_twice_changes_nothing() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, _) = three_entries(&engine, &branch.id).await;
        let before = engine.account_history(&account.id, DateRange::all()).await.unwrap();

        let first = engine.reconcile_account(&account.id, None).await.unwrap();
        let second = engine.reconcile_account(&account.id, None).await.unwrap();

        assert_eq!(first, Money::from_major(-70));
        assert_eq!(first, second);
        let after = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_editing_first_entry_moves_later_balances() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, first_ref) = three_entries(&engine, &branch.id).await;

        let edited = engine
            .edit_ledger_entry(EditEntryRequest {
                account_id: account.id.clone(),
                ref_no: first_ref,
                fields: EntryFields {
                    entry_type: EntryType::CreditSales,
                    amount: Money::from_major(150),
                    paid: Money::zero(),
                    date: day(1),
                },
                operator: Some("manager".into()),
            })
            .await
            .unwrap();
        assert_eq!(edited.status, EntryStatus::Edited);
        assert_eq!(edited.balance, Money::from_major(-150));

        let history = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(
            balances(&history),
            vec![Money::from_major(-150), Money::from_major(-200), Money::from_major(-120)]
        );
        assert_eq!(history[1].amount, Money::from_major(50));
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(-120));

        let log = engine.action_log(&account.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActionKind::LedgerEntryEdited);
    }

    #[tokio::test]
    async fn test_concurrent_payment_and_edit_settle_on_replayed_tail() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, first_ref) = three_entries(&engine, &branch.id).await;

        let edit = EditEntryRequest {
            account_id: account.id.clone(),
            ref_no: first_ref,
            fields: EntryFields {
                entry_type: EntryType::CreditSales,
                amount: Money::from_major(150),
                paid: Money::zero(),
                date: day(1),
            },
            operator: None,
        };
        let (edited, paid) = tokio::join!(
            engine.edit_ledger_entry(edit),
            engine.record_payment(payment(&account, Money::from_major(20), 4)),
        );
        edited.unwrap();
        paid.unwrap();

        let history = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(
            balances(&history),
            vec![
                Money::from_major(-150),
                Money::from_major(-200),
                Money::from_major(-120),
                Money::from_major(-100),
            ]
        );
        let balance = engine.current_balance(&account.id).await.unwrap();
        assert_eq!(balance, history.last().unwrap().balance);
    }

    #[tokio::test]
    async fn test_edit_to_wrong_ledger_type_rejected() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, first_ref) = three_entries(&engine, &branch.id).await;

        let err = engine
            .edit_ledger_entry(EditEntryRequest {
                account_id: account.id.clone(),
                ref_no: first_ref,
                fields: EntryFields {
                    entry_type: EntryType::SupplierDebit,
                    amount: Money::from_major(150),
                    paid: Money::zero(),
                    date: day(1),
                },
                operator: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(-70));
    }

    #[tokio::test]
    async fn test_backdated_payment_replays() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, _) = three_entries(&engine, &branch.id).await;

        let mut late = payment(&account, Money::from_major(30), 0);
        late.ref_no = Some("CASH-77".into());
        let entry = engine.record_payment(late).await.unwrap();
        assert_eq!(entry.balance, Money::from_major(30));

        let history = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(history[0].ref_no, "CASH-77");
        assert_eq!(
            balances(&history),
            vec![
                Money::from_major(30),
                Money::from_major(-70),
                Money::from_major(-120),
                Money::from_major(-40),
            ]
        );
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(-40));
    }

    #[tokio::test]
    async fn test_retried_payment_is_idempotent() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let account = customer(&engine, &branch.id).await;

        let mut request = payment(&account, Money::from_major(40), 1);
        request.ref_no = Some("CASH-1".into());
        let first = engine.record_payment(request.clone()).await.unwrap();
        let again = engine.record_payment(request.clone()).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(engine.current_balance(&account.id).await.unwrap(), Money::from_major(40));

        request.amount = Money::from_major(41);
        let err = engine.record_payment(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateReference);
    }

    #[tokio::test]
    async fn test_supplier_payment_reduces_what_we_owe() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let supplier = engine
            .create_account(AccountKind::Supplier, &branch.id, "Mills Ltd", None)
            .await
            .unwrap();

        let entry = engine
            .record_payment(payment(&supplier, Money::from_major(250), 1))
            .await
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::SupplierCredit);
        assert_eq!(entry.amount, Money::zero());
        assert_eq!(entry.balance, Money::from_major(-250));
    }

    #[tokio::test]
    async fn test_delete_entry_replays() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let (account, first_ref) = three_entries(&engine, &branch.id).await;

        let balance = engine
            .delete_ledger_entry(&account.id, &first_ref, Some("manager"))
            .await
            .unwrap();
        assert_eq!(balance, Money::from_major(30));

        let history = engine.account_history(&account.id, DateRange::all()).await.unwrap();
        assert_eq!(balances(&history), vec![Money::from_major(-50), Money::from_major(30)]);

        let err = engine
            .delete_ledger_entry(&account.id, &first_ref, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_replay_failure_quarantines_account() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let account = customer(&engine, &branch.id).await;
        let half = Money::from_cents(i64::MAX / 2);

        engine.record_payment(payment(&account, half, 2)).await.unwrap();
        engine.record_payment(payment(&account, half, 3)).await.unwrap();
        let stored = engine.current_balance(&account.id).await.unwrap();
        assert_eq!(stored, Money::from_cents(i64::MAX - 1));

        let err = engine
            .record_payment(payment(&account, Money::from_major(1), 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LedgerReplayFailure);

        let flagged = engine.find_account(&account.id).await.unwrap().unwrap();
        assert!(flagged.reconcile_required);
        assert_eq!(flagged.current_balance, stored);
        assert_eq!(
            engine.account_history(&account.id, DateRange::all()).await.unwrap().len(),
            2
        );

        let err = engine
            .record_payment(payment(&account, Money::from_major(1), 4))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LedgerReplayFailure);

        let balance = engine.reconcile_account(&account.id, Some("manager")).await.unwrap();
        assert_eq!(balance, stored);
        let cleared = engine.find_account(&account.id).await.unwrap().unwrap();
        assert!(!cleared.reconcile_required);
        let log = engine.action_log(&account.id).await.unwrap();
        assert_eq!(log.last().unwrap().action, ActionKind::AccountReconciled);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (engine, branch) = engine_with_branch("MAIN").await;
        let err = engine
            .record_payment(PaymentRequest {
                account_id: "missing".into(),
                branch_id: branch.id.clone(),
                amount: Money::from_major(5),
                date: day(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AccountNotFound);

        let err = engine.current_balance("missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccountNotFound);
    }
}
