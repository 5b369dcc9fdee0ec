//! Cross-cutting invariant checks run inside state-changing operations.
//!
//! Each check is a pure read over store state (plus the records about to be
//! written), so a failing guard aborts the operation before anything is
//! applied.

use crate::error::EngineError;
use crate::status::{BidStatus, DisputeStatus, EscrowStatus, TransactionStatus, VerificationStatus};
use crate::store::StoreInner;
use crate::types::{AmountMinor, WalletAccount, WalletTransaction};

/// Sum of signed amounts of completed transactions currently stored for an
/// account. The reconstruction baseline every balance write is checked
/// against.
pub(crate) fn completed_sum(inner: &StoreInner, account_id: &str) -> AmountMinor {
    inner
        .transactions_for_account(account_id)
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .map(|tx| tx.amount_minor)
        .sum()
}

/// Verify that an account copy about to be written still reconstructs from
/// its completed transactions, counting the new transactions the same
/// operation is writing.
pub(crate) fn check_balance_projection(
    inner: &StoreInner,
    account: &WalletAccount,
    new_transactions: &[&WalletTransaction],
) -> Result<(), EngineError> {
    let projected: AmountMinor = completed_sum(inner, &account.id)
        + new_transactions
            .iter()
            .filter(|tx| tx.account_id == account.id && tx.status == TransactionStatus::Completed)
            .map(|tx| tx.amount_minor)
            .sum::<AmountMinor>();

    if projected != account.balance_minor {
        return Err(EngineError::constraint(format!(
            "account {} balance {} does not reconstruct from completed transactions (expected {})",
            account.id, account.balance_minor, projected
        )));
    }
    if account.balance_minor < 0 {
        return Err(EngineError::constraint(format!(
            "account {} balance would go negative",
            account.id
        )));
    }
    if account.hold_minor < 0 || account.hold_minor > account.balance_minor {
        return Err(EngineError::constraint(format!(
            "account {} withdrawal hold {} outside [0, balance]",
            account.id, account.hold_minor
        )));
    }
    Ok(())
}

/// A campaign may complete only when every bid is terminal and no open or
/// reviewing dispute references it.
pub(crate) fn check_campaign_can_complete(
    inner: &StoreInner,
    campaign_id: &str,
) -> Result<(), EngineError> {
    for bid in inner.bids_for_campaign(campaign_id) {
        if !bid.status.is_terminal() {
            return Err(EngineError::constraint(format!(
                "campaign {campaign_id} has non-terminal bid {} ({})",
                bid.id, bid.status
            )));
        }
    }
    for dispute in inner.disputes_for_campaign(campaign_id) {
        if matches!(
            dispute.status,
            DisputeStatus::Open | DisputeStatus::UnderReview
        ) {
            return Err(EngineError::constraint(format!(
                "campaign {campaign_id} has unresolved dispute {}",
                dispute.id
            )));
        }
    }
    Ok(())
}

/// Cancellation is blocked while any hold for the campaign is still locked.
pub(crate) fn check_campaign_can_cancel(
    inner: &StoreInner,
    campaign_id: &str,
) -> Result<(), EngineError> {
    for hold in inner.holds_for_campaign(campaign_id) {
        if hold.status == EscrowStatus::Locked {
            return Err(EngineError::constraint(format!(
                "campaign {campaign_id} has locked escrow hold {}",
                hold.id
            )));
        }
    }
    Ok(())
}

/// Full-store audit used by `MarketEngine::verify_consistency`.
pub(crate) fn check_store(inner: &StoreInner) -> Result<(), EngineError> {
    for account in inner.accounts.values() {
        let reconstructed = completed_sum(inner, &account.id);
        if reconstructed != account.balance_minor {
            return Err(EngineError::constraint(format!(
                "account {} balance {} diverged from ledger sum {}",
                account.id, account.balance_minor, reconstructed
            )));
        }
    }

    for bid in inner.bids.values() {
        if bid.status == BidStatus::Paid {
            let hold_id = bid.escrow_hold_id.as_deref().ok_or_else(|| {
                EngineError::constraint(format!("paid bid {} has no escrow hold", bid.id))
            })?;
            let hold = inner.holds.get(hold_id)?;
            if hold.status != EscrowStatus::Released {
                return Err(EngineError::constraint(format!(
                    "paid bid {} references hold {} in state {}",
                    bid.id, hold.id, hold.status
                )));
            }
        }
        if matches!(bid.status, BidStatus::Accepted | BidStatus::Completed) {
            let profile = inner.profiles.get(&bid.creator_id)?;
            if profile.verification_status != VerificationStatus::Approved {
                return Err(EngineError::constraint(format!(
                    "bid {} accepted for unverified creator {}",
                    bid.id, bid.creator_id
                )));
            }
        }
    }

    Ok(())
}
