use crate::context::{is_credit_type, is_debit_type, operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::status::{PaymentMethodKind, TransactionStatus, TransactionType};
use crate::types::{AmountMinor, PaymentMethod, WalletAccount, WalletTransaction};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Apply a completed transaction's balance effect to an account copy.
///
/// The funds guard runs here so no caller can complete a debit past zero.
pub(crate) fn apply_completed(
    account: &mut WalletAccount,
    tx: &WalletTransaction,
) -> Result<(), EngineError> {
    if tx.account_id != account.id {
        return Err(EngineError::constraint(format!(
            "transaction {} does not belong to account {}",
            tx.id, account.id
        )));
    }
    if tx.amount_minor < 0 && account.balance_minor + tx.amount_minor < 0 {
        return Err(EngineError::InsufficientFunds {
            account_id: account.id.clone(),
            available_minor: account.balance_minor,
            required_minor: -tx.amount_minor,
        });
    }

    account.balance_minor += tx.amount_minor;
    match tx.tx_type {
        TransactionType::EscrowLock => account.total_spent_minor += -tx.amount_minor,
        TransactionType::EscrowRefund => account.total_spent_minor -= tx.amount_minor,
        TransactionType::EscrowRelease | TransactionType::PlatformFee => {
            account.total_earned_minor += tx.amount_minor
        }
        _ => {}
    }
    account.updated_at = Utc::now();
    Ok(())
}

/// Build a transaction that settles immediately inside the caller's atomic
/// unit: opened pending, driven through processing, completed with the
/// balance effect applied to `account`. Used for internal movements (escrow
/// lock/release/refund, platform fees) that have no external settlement
/// phase. The returned drafts record the full lifecycle.
pub(crate) fn settle_now(
    account: &mut WalletAccount,
    tx_type: TransactionType,
    amount_minor: AmountMinor,
    description: impl Into<String>,
    hold_id: Option<String>,
) -> Result<(WalletTransaction, Vec<JournalDraft>), EngineError> {
    if amount_minor == 0 {
        return Err(EngineError::constraint("zero-amount transaction"));
    }
    if is_credit_type(tx_type) && amount_minor < 0 || is_debit_type(tx_type) && amount_minor > 0 {
        return Err(EngineError::constraint(format!(
            "amount sign does not match transaction type {tx_type}"
        )));
    }

    let mut tx = WalletTransaction::open(&account.id, tx_type, amount_minor, description);
    tx.hold_id = hold_id;
    tx.status = TransactionStatus::Completed;
    tx.completed_at = Some(Utc::now());
    apply_completed(account, &tx)?;

    let drafts = vec![
        JournalDraft::transition("wallet_transaction", &tx.id, "pending", "processing"),
        JournalDraft::transition("wallet_transaction", &tx.id, "processing", "completed"),
        JournalDraft::money(&tx, account.balance_minor),
    ];
    Ok((tx, drafts))
}

/// Wallet accounts and their transaction lifecycles.
#[derive(Clone)]
pub struct LedgerStore {
    ctx: Arc<EngineContext>,
}

impl LedgerStore {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn create_account(
        &self,
        owner_id: &str,
        currency: Option<String>,
    ) -> Result<WalletAccount, EngineError> {
        let op_id = operation_id();
        let currency = currency.unwrap_or_else(|| self.ctx.config.currency.clone());
        let account = WalletAccount::new(owner_id, currency);

        let _lane = self.ctx.write_lane.lock().await;
        {
            let inner = self.ctx.store.read()?;
            if inner.account_for_owner(owner_id).is_some() {
                return Err(EngineError::constraint(format!(
                    "owner {owner_id} already has a wallet account"
                )));
            }
        }
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("wallet_account:{}", account.id)),
                    format!("wallet account opened for owner {owner_id}"),
                )],
            )
            .await?;
        self.ctx.store.write()?.insert_account(account.clone())?;
        info!(account_id = %account.id, owner_id, "wallet account opened");
        Ok(account)
    }

    pub fn account(&self, account_id: &str) -> Result<WalletAccount, EngineError> {
        Ok(self.ctx.store.read()?.accounts.get(account_id)?.clone())
    }

    pub fn account_for_owner(&self, owner_id: &str) -> Result<WalletAccount, EngineError> {
        let inner = self.ctx.store.read()?;
        inner
            .account_for_owner(owner_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("wallet_account", owner_id))
    }

    pub fn transaction(&self, tx_id: &str) -> Result<WalletTransaction, EngineError> {
        Ok(self.ctx.store.read()?.transactions.get(tx_id)?.clone())
    }

    pub fn transactions_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<WalletTransaction>, EngineError> {
        let inner = self.ctx.store.read()?;
        let mut txs: Vec<WalletTransaction> = inner
            .transactions_for_account(account_id)
            .into_iter()
            .cloned()
            .collect();
        txs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(txs)
    }

    pub async fn register_payment_method(
        &self,
        account_id: &str,
        kind: PaymentMethodKind,
        destination: &str,
    ) -> Result<PaymentMethod, EngineError> {
        let op_id = operation_id();
        let method = PaymentMethod::new(account_id, kind, destination);

        let _lane = self.ctx.write_lane.lock().await;
        self.ctx.store.read()?.accounts.get(account_id)?;
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("payment_method:{}", method.id)),
                    format!("{kind} payout destination registered"),
                )],
            )
            .await?;
        self.ctx.store.write()?.payment_methods.insert(method.clone())?;
        Ok(method)
    }

    /// Open a pending transaction with no balance effect yet. This is the
    /// only step a caller may blindly retry after a transient fault.
    pub async fn open_transaction(
        &self,
        account_id: &str,
        tx_type: TransactionType,
        amount_minor: AmountMinor,
        description: &str,
    ) -> Result<WalletTransaction, EngineError> {
        if amount_minor == 0 {
            return Err(EngineError::constraint("zero-amount transaction"));
        }
        if is_credit_type(tx_type) && amount_minor < 0
            || is_debit_type(tx_type) && amount_minor > 0
        {
            return Err(EngineError::constraint(format!(
                "amount sign does not match transaction type {tx_type}"
            )));
        }

        let op_id = operation_id();
        let tx = WalletTransaction::open(account_id, tx_type, amount_minor, description);

        let _lane = self.ctx.write_lane.lock().await;
        self.ctx.store.read()?.accounts.get(account_id)?;
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("wallet_transaction:{}", tx.id)),
                    format!("{} transaction opened for {amount_minor}", tx.tx_type),
                )],
            )
            .await?;
        self.ctx.store.write()?.transactions.insert(tx.clone())?;
        Ok(tx)
    }

    /// Drive a transaction along its lifecycle. The balance write happens in
    /// the same atomic unit as the transition to `completed`; terminal
    /// transactions are immutable.
    pub async fn advance(
        &self,
        tx_id: &str,
        target: TransactionStatus,
    ) -> Result<WalletTransaction, EngineError> {
        let op_id = operation_id();
        let snapshot = self.transaction(tx_id)?;
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "wallet_transaction",
                tx_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (tx, account, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.transactions.expect_version(tx_id, snapshot.version)?;
            let mut tx = inner.transactions.get(tx_id)?.clone();
            let mut account = inner.accounts.get(&tx.account_id)?.clone();

            let mut drafts = vec![JournalDraft::transition(
                "wallet_transaction",
                tx_id,
                tx.status,
                target,
            )];
            tx.status = target;

            let mut account_touched = false;
            if target == TransactionStatus::Completed {
                tx.completed_at = Some(Utc::now());
                apply_completed(&mut account, &tx)?;
                drafts.push(JournalDraft::money(&tx, account.balance_minor));
                account_touched = true;
            }
            if target.is_terminal() && tx.reserved_minor > 0 {
                account.hold_minor -= tx.reserved_minor;
                account.updated_at = Utc::now();
                account_touched = true;
            }

            if target == TransactionStatus::Completed {
                crate::guard::check_balance_projection(&inner, &account, &[&tx])?;
            }

            (tx, account_touched.then_some(account), drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.transactions.put(tx)?;
            if let Some(account) = account {
                inner.accounts.put(account)?;
            }
        }
        debug!(tx_id, target = %target, "transaction advanced");
        self.transaction(tx_id)
    }

    /// Credit a deposit in one unit: the gateway has already confirmed, so
    /// the transaction runs pending through completed here.
    pub async fn deposit(
        &self,
        account_id: &str,
        amount_minor: AmountMinor,
        rail: PaymentMethodKind,
    ) -> Result<WalletTransaction, EngineError> {
        if amount_minor <= 0 {
            return Err(EngineError::constraint("deposit amount must be positive"));
        }
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (tx, account, drafts) = {
            let inner = self.ctx.store.read()?;
            let mut account = inner.accounts.get(account_id)?.clone();
            let (mut tx, drafts) = settle_now(
                &mut account,
                TransactionType::Deposit,
                amount_minor,
                format!("deposit via {rail}"),
                None,
            )?;
            tx.rail = Some(rail);
            crate::guard::check_balance_projection(&inner, &account, &[&tx])?;
            (tx, account, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.transactions.insert(tx.clone())?;
            inner.accounts.put(account)?;
        }
        info!(account_id, amount_minor, "deposit credited");
        Ok(tx)
    }

    /// Reserve funds and open a pending withdrawal against a registered
    /// payout method. The balance itself moves only when the withdrawal
    /// completes.
    pub async fn request_withdrawal(
        &self,
        account_id: &str,
        amount_minor: AmountMinor,
        method_id: &str,
    ) -> Result<WalletTransaction, EngineError> {
        if amount_minor <= 0 {
            return Err(EngineError::constraint(
                "withdrawal amount must be positive",
            ));
        }
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (tx, account) = {
            let inner = self.ctx.store.read()?;
            let mut account = inner.accounts.get(account_id)?.clone();
            let method = inner.payment_methods.get(method_id)?;
            if method.account_id != account_id {
                return Err(EngineError::constraint(format!(
                    "payment method {method_id} does not belong to account {account_id}"
                )));
            }
            if account.available_minor() < amount_minor {
                return Err(EngineError::InsufficientFunds {
                    account_id: account_id.to_string(),
                    available_minor: account.available_minor(),
                    required_minor: amount_minor,
                });
            }

            let mut tx = WalletTransaction::open(
                account_id,
                TransactionType::Withdrawal,
                -amount_minor,
                format!("withdrawal via {}", method.kind),
            )
            .with_rail(method.kind);
            tx.reserved_minor = amount_minor;
            account.hold_minor += amount_minor;
            account.updated_at = Utc::now();
            (tx, account)
        };

        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("wallet_transaction:{}", tx.id)),
                    format!("withdrawal of {amount_minor} requested"),
                )],
            )
            .await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.transactions.insert(tx.clone())?;
            inner.accounts.put(account)?;
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::storage::PersistentJournal;

    fn test_ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            EngineConfig::default(),
            PersistentJournal::from_entries(Vec::new()).unwrap(),
        ))
    }

    #[tokio::test]
    async fn deposit_credits_balance() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("brand-1", None).await.unwrap();
        let tx = ledger
            .deposit(&account.id, 1_000, PaymentMethodKind::Mpesa)
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(ledger.account(&account.id).unwrap().balance_minor, 1_000);
    }

    #[tokio::test]
    async fn advance_enforces_lifecycle_and_immutability() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("brand-1", None).await.unwrap();
        let tx = ledger
            .open_transaction(&account.id, TransactionType::Deposit, 500, "manual top up")
            .await
            .unwrap();

        // pending cannot jump straight to completed
        let err = ledger
            .advance(&tx.id, TransactionStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        ledger
            .advance(&tx.id, TransactionStatus::Processing)
            .await
            .unwrap();
        let done = ledger
            .advance(&tx.id, TransactionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(ledger.account(&account.id).unwrap().balance_minor, 500);

        let err = ledger
            .advance(&tx.id, TransactionStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn completing_an_overdraft_fails() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("brand-1", None).await.unwrap();
        ledger
            .deposit(&account.id, 200, PaymentMethodKind::Mpesa)
            .await
            .unwrap();

        let tx = ledger
            .open_transaction(
                &account.id,
                TransactionType::EscrowLock,
                -500,
                "manual lock",
            )
            .await
            .unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Processing)
            .await
            .unwrap();
        let err = ledger
            .advance(&tx.id, TransactionStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(ledger.account(&account.id).unwrap().balance_minor, 200);
    }

    #[tokio::test]
    async fn withdrawal_reserves_and_releases_funds() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("creator-1", None).await.unwrap();
        ledger
            .deposit(&account.id, 1_000, PaymentMethodKind::Mpesa)
            .await
            .unwrap();
        let method = ledger
            .register_payment_method(&account.id, PaymentMethodKind::Mpesa, "254700000001")
            .await
            .unwrap();

        let tx = ledger
            .request_withdrawal(&account.id, 600, &method.id)
            .await
            .unwrap();
        let mid = ledger.account(&account.id).unwrap();
        assert_eq!(mid.balance_minor, 1_000);
        assert_eq!(mid.available_minor(), 400);

        // a second request over the remaining available amount fails
        let err = ledger
            .request_withdrawal(&account.id, 500, &method.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));

        ledger
            .advance(&tx.id, TransactionStatus::Processing)
            .await
            .unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Completed)
            .await
            .unwrap();
        let after = ledger.account(&account.id).unwrap();
        assert_eq!(after.balance_minor, 400);
        assert_eq!(after.hold_minor, 0);
    }

    #[tokio::test]
    async fn cancelled_withdrawal_releases_reservation_without_balance_effect() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("creator-1", None).await.unwrap();
        ledger
            .deposit(&account.id, 1_000, PaymentMethodKind::AirtelMoney)
            .await
            .unwrap();
        let method = ledger
            .register_payment_method(&account.id, PaymentMethodKind::AirtelMoney, "254730000001")
            .await
            .unwrap();

        let tx = ledger
            .request_withdrawal(&account.id, 300, &method.id)
            .await
            .unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Cancelled)
            .await
            .unwrap();

        let after = ledger.account(&account.id).unwrap();
        assert_eq!(after.balance_minor, 1_000);
        assert_eq!(after.hold_minor, 0);
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_concurrent_modification() {
        let ledger = LedgerStore::new(test_ctx());
        let account = ledger.create_account("brand-1", None).await.unwrap();
        let tx = ledger
            .open_transaction(&account.id, TransactionType::Deposit, 100, "top up")
            .await
            .unwrap();

        // Another writer advances the transaction between snapshot and apply.
        let ctx_tx = ledger.transaction(&tx.id).unwrap();
        ledger
            .advance(&tx.id, TransactionStatus::Processing)
            .await
            .unwrap();

        // Simulate the stale path by checking the version directly.
        let inner = ledger.ctx.store.read().unwrap();
        let err = inner
            .transactions
            .expect_version(&tx.id, ctx_tx.version)
            .unwrap_err();
        assert!(matches!(err, EngineError::ConcurrentModification { .. }));
    }
}
