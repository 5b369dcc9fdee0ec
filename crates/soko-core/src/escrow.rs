use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::ledger::settle_now;
use crate::notify::{NotificationEvent, NotificationKind};
use crate::status::{BidStatus, EscrowStatus, TransactionType};
use crate::types::{AmountMinor, EscrowHold, WalletAccount, WalletTransaction};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Platform cut of an escrow release, in integer minor units.
pub(crate) fn platform_fee(amount_minor: AmountMinor, fee_percent: u8) -> AmountMinor {
    amount_minor * AmountMinor::from(fee_percent) / 100
}

/// Open a locked hold and its `escrow_lock` transaction against a payer
/// account copy. Fails before any mutation if the payer cannot cover the
/// amount.
pub(crate) fn build_lock(
    payer: &mut WalletAccount,
    payee_account_id: &str,
    campaign_id: &str,
    bid_id: &str,
    amount_minor: AmountMinor,
    auto_release_days: i64,
) -> Result<(EscrowHold, WalletTransaction, Vec<JournalDraft>), EngineError> {
    if amount_minor <= 0 {
        return Err(EngineError::constraint("escrow amount must be positive"));
    }
    if payer.available_minor() < amount_minor {
        return Err(EngineError::InsufficientFunds {
            account_id: payer.id.clone(),
            available_minor: payer.available_minor(),
            required_minor: amount_minor,
        });
    }

    let hold_id = Uuid::new_v4().to_string();
    let (lock_tx, mut drafts) = settle_now(
        payer,
        TransactionType::EscrowLock,
        -amount_minor,
        format!("escrow lock for bid {bid_id}"),
        Some(hold_id.clone()),
    )?;

    let now = Utc::now();
    let hold = EscrowHold {
        id: hold_id,
        campaign_id: campaign_id.to_string(),
        bid_id: bid_id.to_string(),
        payer_account_id: payer.id.clone(),
        payee_account_id: payee_account_id.to_string(),
        amount_minor,
        status: EscrowStatus::Locked,
        lock_transaction_id: lock_tx.id.clone(),
        settle_transaction_id: None,
        parent_hold_id: None,
        locked_at: now,
        auto_release_at: now + Duration::days(auto_release_days),
        resolved_at: None,
        version: 1,
    };
    drafts.push(JournalDraft::note(
        Some(format!("escrow_hold:{}", hold.id)),
        format!("escrow of {amount_minor} locked for bid {bid_id}"),
    ));
    Ok((hold, lock_tx, drafts))
}

/// Settle a hold in favor of the payee, splitting out the platform fee.
pub(crate) fn build_release(
    hold: &mut EscrowHold,
    payee: &mut WalletAccount,
    platform: &mut WalletAccount,
    fee_percent: u8,
) -> Result<(Vec<WalletTransaction>, Vec<JournalDraft>), EngineError> {
    if !hold.status.can_advance(EscrowStatus::Released) {
        return Err(EngineError::IllegalHoldState {
            hold_id: hold.id.clone(),
            status: hold.status.as_str().to_string(),
            operation: "release",
        });
    }

    let fee = platform_fee(hold.amount_minor, fee_percent);
    let payee_credit = hold.amount_minor - fee;
    let from = hold.status;

    let (release_tx, mut drafts) = settle_now(
        payee,
        TransactionType::EscrowRelease,
        payee_credit,
        format!("escrow release for bid {}", hold.bid_id),
        Some(hold.id.clone()),
    )?;
    let mut txs = vec![release_tx];

    if fee > 0 {
        let (fee_tx, fee_drafts) = settle_now(
            platform,
            TransactionType::PlatformFee,
            fee,
            format!("platform fee for bid {}", hold.bid_id),
            Some(hold.id.clone()),
        )?;
        drafts.extend(fee_drafts);
        txs.push(fee_tx);
    }

    hold.status = EscrowStatus::Released;
    hold.settle_transaction_id = Some(txs[0].id.clone());
    hold.resolved_at = Some(Utc::now());
    drafts.push(JournalDraft::transition(
        "escrow_hold",
        &hold.id,
        from,
        EscrowStatus::Released,
    ));
    Ok((txs, drafts))
}

/// Settle a hold back to the payer in full.
pub(crate) fn build_refund(
    hold: &mut EscrowHold,
    payer: &mut WalletAccount,
) -> Result<(WalletTransaction, Vec<JournalDraft>), EngineError> {
    if !hold.status.can_advance(EscrowStatus::Refunded) {
        return Err(EngineError::IllegalHoldState {
            hold_id: hold.id.clone(),
            status: hold.status.as_str().to_string(),
            operation: "refund",
        });
    }
    let from = hold.status;

    let (refund_tx, mut drafts) = settle_now(
        payer,
        TransactionType::EscrowRefund,
        hold.amount_minor,
        format!("escrow refund for bid {}", hold.bid_id),
        Some(hold.id.clone()),
    )?;

    hold.status = EscrowStatus::Refunded;
    hold.settle_transaction_id = Some(refund_tx.id.clone());
    hold.resolved_at = Some(Utc::now());
    drafts.push(JournalDraft::transition(
        "escrow_hold",
        &hold.id,
        from,
        EscrowStatus::Refunded,
    ));
    Ok((refund_tx, drafts))
}

/// Freeze a locked hold pending dispute resolution.
pub(crate) fn build_mark_disputed(hold: &mut EscrowHold) -> Result<Vec<JournalDraft>, EngineError> {
    if !hold.status.can_advance(EscrowStatus::Disputed) {
        return Err(EngineError::IllegalHoldState {
            hold_id: hold.id.clone(),
            status: hold.status.as_str().to_string(),
            operation: "mark_disputed",
        });
    }
    let from = hold.status;
    hold.status = EscrowStatus::Disputed;
    Ok(vec![JournalDraft::transition(
        "escrow_hold",
        &hold.id,
        from,
        EscrowStatus::Disputed,
    )])
}

/// Escrow holds and their settlement against the wallet ledger.
#[derive(Clone)]
pub struct EscrowManager {
    ctx: Arc<EngineContext>,
}

impl EscrowManager {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn hold(&self, hold_id: &str) -> Result<EscrowHold, EngineError> {
        Ok(self.ctx.store.read()?.holds.get(hold_id)?.clone())
    }

    pub fn holds_for_campaign(&self, campaign_id: &str) -> Result<Vec<EscrowHold>, EngineError> {
        Ok(self
            .ctx
            .store
            .read()?
            .holds_for_campaign(campaign_id)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Pay out a locked hold. Gated on the bid having completed (its
    /// deliverable verified); the bid moves to `paid` in the same unit.
    pub async fn release(&self, hold_id: &str) -> Result<EscrowHold, EngineError> {
        let op_id = operation_id();
        let snapshot = self.hold(hold_id)?;
        if snapshot.status != EscrowStatus::Locked {
            return Err(EngineError::IllegalHoldState {
                hold_id: hold_id.to_string(),
                status: snapshot.status.as_str().to_string(),
                operation: "release",
            });
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (hold, bid, payee, platform, txs, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.holds.expect_version(hold_id, snapshot.version)?;
            let mut hold = inner.holds.get(hold_id)?.clone();
            let mut bid = inner.bids.get(&hold.bid_id)?.clone();
            if bid.status != BidStatus::Completed {
                return Err(EngineError::VerificationRequired(format!(
                    "bid {} is {} and has no verified deliverable; escrow cannot be released",
                    bid.id, bid.status
                )));
            }
            let mut payee = inner.accounts.get(&hold.payee_account_id)?.clone();
            let platform_id = self.ctx.platform_account_id()?;
            let mut platform = inner.accounts.get(&platform_id)?.clone();

            let (txs, mut drafts) = build_release(
                &mut hold,
                &mut payee,
                &mut platform,
                self.ctx.config.platform_fee_percent,
            )?;
            drafts.push(JournalDraft::transition(
                "bid",
                &bid.id,
                BidStatus::Completed,
                BidStatus::Paid,
            ));
            bid.status = BidStatus::Paid;
            bid.updated_at = Utc::now();

            let tx_refs: Vec<&WalletTransaction> = txs.iter().collect();
            crate::guard::check_balance_projection(&inner, &payee, &tx_refs)?;
            crate::guard::check_balance_projection(&inner, &platform, &tx_refs)?;
            (hold, bid, payee, platform, txs, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        let bid_id = bid.id.clone();
        let campaign_id = hold.campaign_id.clone();
        {
            let mut inner = self.ctx.store.write()?;
            for tx in txs {
                inner.transactions.insert(tx)?;
            }
            inner.accounts.put(payee)?;
            inner.accounts.put(platform)?;
            inner.holds.put(hold)?;
            inner.bids.put(bid)?;
        }
        drop(_lane);

        info!(hold_id, bid_id = %bid_id, "escrow released");
        self.ctx
            .emit(NotificationEvent::new(
                NotificationKind::BidPaid,
                bid_id,
                Some(campaign_id),
                "escrow released and bid paid",
            ))
            .await;
        self.hold(hold_id)
    }

    /// Return a locked or disputed hold's funds to the payer.
    pub async fn refund(&self, hold_id: &str) -> Result<EscrowHold, EngineError> {
        let op_id = operation_id();
        let snapshot = self.hold(hold_id)?;

        let _lane = self.ctx.write_lane.lock().await;
        let (hold, payer, tx, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.holds.expect_version(hold_id, snapshot.version)?;
            let mut hold = inner.holds.get(hold_id)?.clone();
            let mut payer = inner.accounts.get(&hold.payer_account_id)?.clone();
            let (tx, drafts) = build_refund(&mut hold, &mut payer)?;
            crate::guard::check_balance_projection(&inner, &payer, &[&tx])?;
            (hold, payer, tx, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        let campaign_id = hold.campaign_id.clone();
        {
            let mut inner = self.ctx.store.write()?;
            inner.transactions.insert(tx)?;
            inner.accounts.put(payer)?;
            inner.holds.put(hold)?;
        }
        drop(_lane);

        info!(hold_id, "escrow refunded");
        self.ctx
            .emit(NotificationEvent::new(
                NotificationKind::EscrowRefunded,
                hold_id,
                Some(campaign_id),
                "escrow refunded to payer",
            ))
            .await;
        self.hold(hold_id)
    }

    /// Freeze a locked hold. Normally invoked by the dispute resolver when a
    /// dispute opens.
    pub async fn mark_disputed(&self, hold_id: &str) -> Result<EscrowHold, EngineError> {
        let op_id = operation_id();
        let snapshot = self.hold(hold_id)?;

        let _lane = self.ctx.write_lane.lock().await;
        let (hold, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.holds.expect_version(hold_id, snapshot.version)?;
            let mut hold = inner.holds.get(hold_id)?.clone();
            let drafts = build_mark_disputed(&mut hold)?;
            (hold, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.holds.put(hold)?;
        self.hold(hold_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_account(owner: &str, balance: AmountMinor) -> WalletAccount {
        let mut account = WalletAccount::new(owner, "KES");
        account.balance_minor = balance;
        account
    }

    #[test]
    fn lock_debits_payer_at_lock_time() {
        let mut payer = funded_account("brand-1", 1_000);
        let (hold, lock_tx, _) =
            build_lock(&mut payer, "payee-acct", "c-1", "b-1", 1_000, 14).unwrap();

        assert_eq!(payer.balance_minor, 0);
        assert_eq!(payer.total_spent_minor, 1_000);
        assert_eq!(hold.status, EscrowStatus::Locked);
        assert_eq!(lock_tx.amount_minor, -1_000);
        assert_eq!(lock_tx.hold_id.as_deref(), Some(hold.id.as_str()));
    }

    #[test]
    fn lock_respects_withdrawal_reservations() {
        let mut payer = funded_account("brand-1", 1_000);
        payer.hold_minor = 400;
        let err = build_lock(&mut payer, "payee-acct", "c-1", "b-1", 700, 14).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientFunds {
                available_minor: 600,
                required_minor: 700,
                ..
            }
        ));
    }

    #[test]
    fn release_splits_platform_fee_and_settles_once() {
        let mut payer = funded_account("brand-1", 1_000);
        let (mut hold, _, _) = build_lock(&mut payer, "payee-acct", "c-1", "b-1", 1_000, 14).unwrap();

        let mut payee = funded_account("creator-1", 0);
        let mut platform = funded_account("platform", 0);
        let (txs, _) = build_release(&mut hold, &mut payee, &mut platform, 10).unwrap();

        assert_eq!(payee.balance_minor, 900);
        assert_eq!(payee.total_earned_minor, 900);
        assert_eq!(platform.balance_minor, 100);
        assert_eq!(hold.status, EscrowStatus::Released);
        assert_eq!(txs.len(), 2);

        let err = build_release(&mut hold, &mut payee, &mut platform, 10).unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalHoldState {
                operation: "release",
                ..
            }
        ));
    }

    #[test]
    fn refund_after_release_is_rejected() {
        let mut payer = funded_account("brand-1", 500);
        let (mut hold, _, _) = build_lock(&mut payer, "payee-acct", "c-1", "b-1", 500, 14).unwrap();

        let mut payee = funded_account("creator-1", 0);
        let mut platform = funded_account("platform", 0);
        build_release(&mut hold, &mut payee, &mut platform, 0).unwrap();

        let err = build_refund(&mut hold, &mut payer).unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalHoldState {
                operation: "refund",
                ..
            }
        ));
        assert_eq!(payer.balance_minor, 0);
    }

    #[test]
    fn disputed_hold_can_refund_but_not_redispute() {
        let mut payer = funded_account("brand-1", 500);
        let (mut hold, _, _) = build_lock(&mut payer, "payee-acct", "c-1", "b-1", 500, 14).unwrap();

        build_mark_disputed(&mut hold).unwrap();
        assert_eq!(hold.status, EscrowStatus::Disputed);
        assert!(build_mark_disputed(&mut hold).is_err());

        let (refund_tx, _) = build_refund(&mut hold, &mut payer).unwrap();
        assert_eq!(payer.balance_minor, 500);
        assert_eq!(refund_tx.amount_minor, 500);
        assert_eq!(hold.status, EscrowStatus::Refunded);
    }

    #[test]
    fn zero_fee_release_pays_full_amount() {
        let mut payer = funded_account("brand-1", 300);
        let (mut hold, _, _) = build_lock(&mut payer, "payee-acct", "c-1", "b-1", 300, 14).unwrap();

        let mut payee = funded_account("creator-1", 0);
        let mut platform = funded_account("platform", 0);
        let (txs, _) = build_release(&mut hold, &mut payee, &mut platform, 0).unwrap();

        assert_eq!(payee.balance_minor, 300);
        assert_eq!(platform.balance_minor, 0);
        assert_eq!(txs.len(), 1);
    }
}
