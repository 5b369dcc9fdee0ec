use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::escrow::build_lock;
use crate::status::{BidStatus, CampaignStatus, VerificationStatus};
use crate::types::{AmountMinor, Bid, WalletAccount};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Bids and the acceptance checkpoint that commits brand funds.
#[derive(Clone)]
pub struct BidManager {
    ctx: Arc<EngineContext>,
}

impl BidManager {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn bid(&self, bid_id: &str) -> Result<Bid, EngineError> {
        Ok(self.ctx.store.read()?.bids.get(bid_id)?.clone())
    }

    pub fn bids_for_campaign(&self, campaign_id: &str) -> Result<Vec<Bid>, EngineError> {
        let inner = self.ctx.store.read()?;
        let mut bids: Vec<Bid> = inner
            .bids_for_campaign(campaign_id)
            .into_iter()
            .cloned()
            .collect();
        bids.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(bids)
    }

    /// Place a bid on an open or pending campaign. The first bid moves the
    /// campaign from `open` to `pending`.
    pub async fn place(
        &self,
        campaign_id: &str,
        creator_id: &str,
        amount_minor: AmountMinor,
        message: Option<String>,
    ) -> Result<Bid, EngineError> {
        if amount_minor <= 0 {
            return Err(EngineError::constraint("bid amount must be positive"));
        }
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (bid, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            let profile = inner.profiles.get(creator_id)?;
            if profile.verification_status != VerificationStatus::Approved {
                return Err(EngineError::VerificationRequired(format!(
                    "creator {creator_id} is {} and may not bid",
                    profile.verification_status
                )));
            }

            let campaign = inner.campaigns.get(campaign_id)?.clone();
            if !matches!(
                campaign.status,
                CampaignStatus::Open | CampaignStatus::Pending
            ) {
                return Err(EngineError::constraint(format!(
                    "campaign {campaign_id} is {} and not accepting bids",
                    campaign.status
                )));
            }

            let duplicate = inner
                .bids_for_campaign(campaign_id)
                .iter()
                .any(|b| b.creator_id == creator_id && b.status == BidStatus::Pending);
            if duplicate {
                return Err(EngineError::constraint(format!(
                    "creator {creator_id} already has a pending bid on campaign {campaign_id}"
                )));
            }

            let now = Utc::now();
            let bid = Bid {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign_id.to_string(),
                creator_id: creator_id.to_string(),
                amount_minor,
                message,
                package_id: None,
                status: BidStatus::Pending,
                escrow_hold_id: None,
                version: 1,
                created_at: now,
                updated_at: now,
            };

            let mut drafts = vec![JournalDraft::note(
                Some(format!("bid:{}", bid.id)),
                format!("bid of {amount_minor} placed on campaign {campaign_id}"),
            )];
            let campaign = if campaign.status == CampaignStatus::Open {
                let mut updated = campaign;
                drafts.push(JournalDraft::transition(
                    "campaign",
                    campaign_id,
                    CampaignStatus::Open,
                    CampaignStatus::Pending,
                ));
                updated.status = CampaignStatus::Pending;
                updated.updated_at = now;
                Some(updated)
            } else {
                None
            };
            (bid, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.bids.insert(bid.clone())?;
            if let Some(campaign) = campaign {
                inner.campaigns.put(campaign)?;
            }
        }
        Ok(bid)
    }

    /// Accept a bid: lock escrow for its amount and move the campaign to
    /// `accepted`, all in one unit. If the lock fails nothing is applied and
    /// the bid stays pending. A campaign may award several bids; further
    /// accepts while it is already `accepted` add their own holds.
    pub async fn accept(&self, bid_id: &str) -> Result<Bid, EngineError> {
        let op_id = operation_id();
        let snapshot = self.bid(bid_id)?;
        if !snapshot.status.can_advance(BidStatus::Accepted) {
            return Err(EngineError::invalid_transition(
                "bid",
                bid_id,
                snapshot.status.as_str(),
                BidStatus::Accepted.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (bid, campaign, hold, lock_tx, payer, payee, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.bids.expect_version(bid_id, snapshot.version)?;
            let mut bid = inner.bids.get(bid_id)?.clone();
            let mut campaign = inner.campaigns.get(&bid.campaign_id)?.clone();
            let campaign_moves = campaign.status != CampaignStatus::Accepted;
            if campaign_moves && !campaign.status.can_advance(CampaignStatus::Accepted) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    &campaign.id,
                    campaign.status.as_str(),
                    CampaignStatus::Accepted.as_str(),
                ));
            }

            let profile = inner.profiles.get(&bid.creator_id)?;
            if profile.verification_status != VerificationStatus::Approved {
                return Err(EngineError::VerificationRequired(format!(
                    "creator {} is {} and may not hold an accepted bid",
                    bid.creator_id, profile.verification_status
                )));
            }

            let mut payer = inner
                .account_for_owner(&campaign.brand_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("wallet_account", &campaign.brand_id))?;

            // The creator may not have a wallet yet; open one so the payout
            // destination exists before funds are committed.
            let (payee, payee_is_new) = match inner.account_for_owner(&bid.creator_id) {
                Some(existing) => (existing.clone(), false),
                None => (
                    WalletAccount::new(&bid.creator_id, &self.ctx.config.currency),
                    true,
                ),
            };

            let (hold, lock_tx, mut drafts) = build_lock(
                &mut payer,
                &payee.id,
                &campaign.id,
                &bid.id,
                bid.amount_minor,
                self.ctx.config.auto_release_days,
            )?;

            let now = Utc::now();
            drafts.push(JournalDraft::transition(
                "bid",
                &bid.id,
                BidStatus::Pending,
                BidStatus::Accepted,
            ));
            bid.status = BidStatus::Accepted;
            bid.escrow_hold_id = Some(hold.id.clone());
            bid.updated_at = now;

            if campaign_moves {
                drafts.push(JournalDraft::transition(
                    "campaign",
                    &campaign.id,
                    campaign.status,
                    CampaignStatus::Accepted,
                ));
                campaign.status = CampaignStatus::Accepted;
                campaign.creator_id = Some(bid.creator_id.clone());
                if campaign.package_id.is_none() {
                    campaign.package_id = bid.package_id.clone();
                }
            }
            campaign.updated_at = now;

            crate::guard::check_balance_projection(&inner, &payer, &[&lock_tx])?;
            let payee = payee_is_new.then_some(payee);
            (bid, campaign, hold, lock_tx, payer, payee, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            if let Some(payee) = payee {
                inner.insert_account(payee)?;
            }
            inner.transactions.insert(lock_tx)?;
            inner.holds.insert(hold)?;
            inner.accounts.put(payer)?;
            inner.bids.put(bid)?;
            inner.campaigns.put(campaign)?;
        }
        info!(bid_id, "bid accepted and escrow locked");
        self.bid(bid_id)
    }

    pub async fn reject(&self, bid_id: &str) -> Result<Bid, EngineError> {
        self.settle_pending(bid_id, BidStatus::Rejected).await
    }

    /// Creator-initiated exit, only from `pending`.
    pub async fn withdraw(&self, bid_id: &str) -> Result<Bid, EngineError> {
        self.settle_pending(bid_id, BidStatus::Withdrawn).await
    }

    async fn settle_pending(&self, bid_id: &str, target: BidStatus) -> Result<Bid, EngineError> {
        let op_id = operation_id();
        let snapshot = self.bid(bid_id)?;
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "bid",
                bid_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (bid, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.bids.expect_version(bid_id, snapshot.version)?;
            let mut bid = inner.bids.get(bid_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "bid", bid_id, bid.status, target,
            )];
            bid.status = target;
            bid.updated_at = Utc::now();
            (bid, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.bids.put(bid)?;
        self.bid(bid_id)
    }
}
