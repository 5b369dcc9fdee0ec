use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::escrow::{build_lock, build_mark_disputed, build_refund, build_release};
use crate::notify::{NotificationEvent, NotificationKind};
use crate::status::{BidStatus, CampaignStatus, DisputeStatus, EscrowStatus};
use crate::types::{AmountMinor, Bid, Dispute, EscrowHold, WalletAccount, WalletTransaction};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Adjudication outcome required before a dispute can resolve.
#[derive(Debug, Clone)]
pub enum DisputeOutcome {
    /// Pay the disputed escrow out to the creator.
    ReleaseToCreator,
    /// Return the disputed escrow to the brand; the campaign is cancelled.
    RefundToBrand,
    /// Split the single disputed hold: the creator share is paid out, the
    /// remainder refunded. Modeled as two fresh child holds settled at
    /// resolution time, never a partial mutation of the original.
    Split { creator_minor: AmountMinor },
}

/// Disputes that freeze escrow and campaign progress until adjudicated.
#[derive(Clone)]
pub struct DisputeResolver {
    ctx: Arc<EngineContext>,
}

impl DisputeResolver {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn dispute(&self, dispute_id: &str) -> Result<Dispute, EngineError> {
        Ok(self.ctx.store.read()?.disputes.get(dispute_id)?.clone())
    }

    /// File a dispute: the campaign freezes in `disputed` and every locked
    /// hold referencing it is marked disputed in the same unit.
    pub async fn open(
        &self,
        campaign_id: &str,
        raised_by: &str,
        reason: &str,
    ) -> Result<Dispute, EngineError> {
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (dispute, campaign, holds, drafts) = {
            let inner = self.ctx.store.read()?;
            let mut campaign = inner.campaigns.get(campaign_id)?.clone();
            if !campaign.status.can_advance(CampaignStatus::Disputed) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    campaign_id,
                    campaign.status.as_str(),
                    CampaignStatus::Disputed.as_str(),
                ));
            }
            let already_open = inner.disputes_for_campaign(campaign_id).iter().any(|d| {
                matches!(d.status, DisputeStatus::Open | DisputeStatus::UnderReview)
            });
            if already_open {
                return Err(EngineError::constraint(format!(
                    "campaign {campaign_id} already has an open dispute"
                )));
            }

            let dispute = Dispute {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign_id.to_string(),
                raised_by: raised_by.to_string(),
                reason: reason.to_string(),
                status: DisputeStatus::Open,
                resolution: None,
                campaign_status_before: campaign.status,
                version: 1,
                opened_at: Utc::now(),
                resolved_at: None,
            };

            let mut drafts = vec![JournalDraft::note(
                Some(format!("dispute:{}", dispute.id)),
                format!("dispute filed by {raised_by}: {reason}"),
            )];
            let mut holds = Vec::new();
            for hold in inner.holds_for_campaign(campaign_id) {
                if hold.status == EscrowStatus::Locked {
                    let mut frozen = hold.clone();
                    drafts.extend(build_mark_disputed(&mut frozen)?);
                    holds.push(frozen);
                }
            }

            drafts.push(JournalDraft::transition(
                "campaign",
                campaign_id,
                campaign.status,
                CampaignStatus::Disputed,
            ));
            campaign.status = CampaignStatus::Disputed;
            campaign.updated_at = Utc::now();
            (dispute, campaign, holds, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.disputes.insert(dispute.clone())?;
            inner.campaigns.put(campaign)?;
            for hold in holds {
                inner.holds.put(hold)?;
            }
        }
        info!(dispute_id = %dispute.id, campaign_id, "dispute opened");
        Ok(dispute)
    }

    pub async fn begin_review(&self, dispute_id: &str) -> Result<Dispute, EngineError> {
        let op_id = operation_id();
        let snapshot = self.dispute(dispute_id)?;
        if !snapshot.status.can_advance(DisputeStatus::UnderReview) {
            return Err(EngineError::invalid_transition(
                "dispute",
                dispute_id,
                snapshot.status.as_str(),
                DisputeStatus::UnderReview.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (dispute, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.disputes.expect_version(dispute_id, snapshot.version)?;
            let mut dispute = inner.disputes.get(dispute_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "dispute",
                dispute_id,
                dispute.status,
                DisputeStatus::UnderReview,
            )];
            dispute.status = DisputeStatus::UnderReview;
            (dispute, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.disputes.put(dispute)?;
        self.dispute(dispute_id)
    }

    /// Adjudicate a dispute under review. Every disputed hold settles per
    /// the outcome, the affected bids reach their terminal status, and the
    /// campaign lands in `completed` (funds released) or `cancelled` (funds
    /// returned), all in one atomic unit.
    pub async fn resolve(
        &self,
        dispute_id: &str,
        outcome: DisputeOutcome,
        resolution: &str,
    ) -> Result<Dispute, EngineError> {
        let op_id = operation_id();
        let snapshot = self.dispute(dispute_id)?;
        if !snapshot.status.can_advance(DisputeStatus::Resolved) {
            return Err(EngineError::invalid_transition(
                "dispute",
                dispute_id,
                snapshot.status.as_str(),
                DisputeStatus::Resolved.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let plan = {
            let inner = self.ctx.store.read()?;
            inner.disputes.expect_version(dispute_id, snapshot.version)?;
            let mut dispute = inner.disputes.get(dispute_id)?.clone();
            let mut campaign = inner.campaigns.get(&dispute.campaign_id)?.clone();

            let mut accounts: HashMap<String, WalletAccount> = HashMap::new();
            let fetch = |inner: &crate::store::StoreInner,
                             accounts: &mut HashMap<String, WalletAccount>,
                             id: &str|
             -> Result<WalletAccount, EngineError> {
                match accounts.remove(id) {
                    Some(account) => Ok(account),
                    None => Ok(inner.accounts.get(id)?.clone()),
                }
            };

            let disputed: Vec<EscrowHold> = inner
                .holds_for_campaign(&campaign.id)
                .into_iter()
                .filter(|h| h.status == EscrowStatus::Disputed)
                .cloned()
                .collect();
            if let DisputeOutcome::Split { .. } = outcome {
                if disputed.len() != 1 {
                    return Err(EngineError::constraint(format!(
                        "split resolution requires exactly one disputed hold, found {}",
                        disputed.len()
                    )));
                }
            }

            let platform_id = self.ctx.platform_account_id()?;
            let fee_percent = self.ctx.config.platform_fee_percent;
            let now = Utc::now();

            let mut drafts: Vec<JournalDraft> = Vec::new();
            let mut new_txs: Vec<WalletTransaction> = Vec::new();
            let mut new_holds: Vec<EscrowHold> = Vec::new();
            let mut settled_holds: Vec<EscrowHold> = Vec::new();
            let mut bids: Vec<Bid> = Vec::new();

            let pay_bid = |inner: &crate::store::StoreInner,
                               drafts: &mut Vec<JournalDraft>,
                               bid_id: &str|
             -> Result<Bid, EngineError> {
                let mut bid = inner.bids.get(bid_id)?.clone();
                if bid.status == BidStatus::Accepted {
                    drafts.push(JournalDraft::transition(
                        "bid",
                        bid_id,
                        BidStatus::Accepted,
                        BidStatus::Completed,
                    ));
                    bid.status = BidStatus::Completed;
                }
                if bid.status == BidStatus::Completed {
                    drafts.push(JournalDraft::transition(
                        "bid",
                        bid_id,
                        BidStatus::Completed,
                        BidStatus::Paid,
                    ));
                    bid.status = BidStatus::Paid;
                } else {
                    return Err(EngineError::invalid_transition(
                        "bid",
                        bid_id,
                        bid.status.as_str(),
                        BidStatus::Paid.as_str(),
                    ));
                }
                bid.updated_at = now;
                Ok(bid)
            };

            for mut hold in disputed {
                match &outcome {
                    DisputeOutcome::ReleaseToCreator => {
                        let mut payee = fetch(&inner, &mut accounts, &hold.payee_account_id)?;
                        let mut platform = fetch(&inner, &mut accounts, &platform_id)?;
                        let (txs, release_drafts) =
                            build_release(&mut hold, &mut payee, &mut platform, fee_percent)?;
                        drafts.extend(release_drafts);
                        new_txs.extend(txs);
                        bids.push(pay_bid(&inner, &mut drafts, &hold.bid_id)?);
                        accounts.insert(payee.id.clone(), payee);
                        accounts.insert(platform.id.clone(), platform);
                    }
                    DisputeOutcome::RefundToBrand => {
                        let mut payer = fetch(&inner, &mut accounts, &hold.payer_account_id)?;
                        let (tx, refund_drafts) = build_refund(&mut hold, &mut payer)?;
                        drafts.extend(refund_drafts);
                        new_txs.push(tx);
                        accounts.insert(payer.id.clone(), payer);
                    }
                    DisputeOutcome::Split { creator_minor } => {
                        let creator_minor = *creator_minor;
                        if creator_minor <= 0 || creator_minor >= hold.amount_minor {
                            return Err(EngineError::constraint(format!(
                                "split share {creator_minor} outside (0, {})",
                                hold.amount_minor
                            )));
                        }
                        let mut payer = fetch(&inner, &mut accounts, &hold.payer_account_id)?;
                        let mut payee = fetch(&inner, &mut accounts, &hold.payee_account_id)?;
                        let mut platform = fetch(&inner, &mut accounts, &platform_id)?;

                        // Return the parent in full, then settle two child
                        // holds covering both shares.
                        let (refund_tx, refund_drafts) = build_refund(&mut hold, &mut payer)?;
                        drafts.extend(refund_drafts);
                        new_txs.push(refund_tx);

                        let (mut child_creator, lock_a, lock_a_drafts) = build_lock(
                            &mut payer,
                            &hold.payee_account_id,
                            &hold.campaign_id,
                            &hold.bid_id,
                            creator_minor,
                            self.ctx.config.auto_release_days,
                        )?;
                        child_creator.parent_hold_id = Some(hold.id.clone());
                        let child_creator_id = child_creator.id.clone();
                        drafts.extend(lock_a_drafts);
                        new_txs.push(lock_a);
                        let (txs, release_drafts) = build_release(
                            &mut child_creator,
                            &mut payee,
                            &mut platform,
                            fee_percent,
                        )?;
                        drafts.extend(release_drafts);
                        new_txs.extend(txs);
                        new_holds.push(child_creator);

                        let brand_minor = hold.amount_minor - creator_minor;
                        let (mut child_brand, lock_b, lock_b_drafts) = build_lock(
                            &mut payer,
                            &hold.payee_account_id,
                            &hold.campaign_id,
                            &hold.bid_id,
                            brand_minor,
                            self.ctx.config.auto_release_days,
                        )?;
                        child_brand.parent_hold_id = Some(hold.id.clone());
                        drafts.extend(lock_b_drafts);
                        new_txs.push(lock_b);
                        let (refund_b, refund_b_drafts) =
                            build_refund(&mut child_brand, &mut payer)?;
                        drafts.extend(refund_b_drafts);
                        new_txs.push(refund_b);
                        new_holds.push(child_brand);

                        // The paid bid must point at the hold that released
                        // its share, not the refunded parent.
                        let mut bid = pay_bid(&inner, &mut drafts, &hold.bid_id)?;
                        bid.escrow_hold_id = Some(child_creator_id);
                        bids.push(bid);
                        accounts.insert(payer.id.clone(), payer);
                        accounts.insert(payee.id.clone(), payee);
                        accounts.insert(platform.id.clone(), platform);
                    }
                }
                settled_holds.push(hold);
            }

            // Bids never covered by a hold cannot stay pending once the
            // campaign leaves the dispute.
            bids.extend(crate::campaigns::reject_pending_bids(
                &inner,
                &campaign.id,
                &mut drafts,
                now,
            ));

            let campaign_target = match outcome {
                DisputeOutcome::RefundToBrand => CampaignStatus::Cancelled,
                _ => CampaignStatus::Completed,
            };
            drafts.push(JournalDraft::transition(
                "campaign",
                &campaign.id,
                campaign.status,
                campaign_target,
            ));
            campaign.status = campaign_target;
            if campaign_target == CampaignStatus::Completed {
                campaign.completed_at = Some(now);
            }
            campaign.updated_at = now;

            drafts.push(JournalDraft::transition(
                "dispute",
                dispute_id,
                dispute.status,
                DisputeStatus::Resolved,
            ));
            dispute.status = DisputeStatus::Resolved;
            dispute.resolution = Some(resolution.to_string());
            dispute.resolved_at = Some(now);

            let tx_refs: Vec<&WalletTransaction> = new_txs.iter().collect();
            for account in accounts.values() {
                crate::guard::check_balance_projection(&inner, account, &tx_refs)?;
            }

            (
                dispute,
                campaign,
                accounts,
                new_txs,
                new_holds,
                settled_holds,
                bids,
                drafts,
            )
        };
        let (dispute, campaign, accounts, new_txs, new_holds, settled_holds, bids, drafts) = plan;

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            for tx in new_txs {
                inner.transactions.insert(tx)?;
            }
            for hold in new_holds {
                inner.holds.insert(hold)?;
            }
            for hold in settled_holds {
                inner.holds.put(hold)?;
            }
            for account in accounts.into_values() {
                inner.accounts.put(account)?;
            }
            for bid in bids {
                inner.bids.put(bid)?;
            }
            inner.campaigns.put(campaign)?;
            inner.disputes.put(dispute.clone())?;
        }
        drop(_lane);

        info!(dispute_id, "dispute resolved");
        self.ctx
            .emit(NotificationEvent::new(
                NotificationKind::DisputeResolved,
                dispute_id,
                Some(dispute.campaign_id.clone()),
                resolution,
            ))
            .await;
        self.dispute(dispute_id)
    }

    /// Close a dispute. From `resolved` this is archival only; from `open`
    /// or `under_review` it is a withdrawal, thawing the frozen holds and
    /// restoring the campaign to its pre-dispute status.
    pub async fn close(&self, dispute_id: &str, note: &str) -> Result<Dispute, EngineError> {
        let op_id = operation_id();
        let snapshot = self.dispute(dispute_id)?;
        if !snapshot.status.can_advance(DisputeStatus::Closed) {
            return Err(EngineError::invalid_transition(
                "dispute",
                dispute_id,
                snapshot.status.as_str(),
                DisputeStatus::Closed.as_str(),
            ));
        }
        let withdrawn = snapshot.status != DisputeStatus::Resolved;

        let _lane = self.ctx.write_lane.lock().await;
        let (dispute, campaign, holds, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.disputes.expect_version(dispute_id, snapshot.version)?;
            let mut dispute = inner.disputes.get(dispute_id)?.clone();
            let mut drafts = vec![JournalDraft::note(
                Some(format!("dispute:{dispute_id}")),
                format!("dispute closed: {note}"),
            )];

            let mut campaign = None;
            let mut holds = Vec::new();
            if withdrawn {
                for hold in inner.holds_for_campaign(&dispute.campaign_id) {
                    if hold.status == EscrowStatus::Disputed {
                        let mut thawed = hold.clone();
                        drafts.push(JournalDraft::transition(
                            "escrow_hold",
                            &thawed.id,
                            EscrowStatus::Disputed,
                            EscrowStatus::Locked,
                        ));
                        thawed.status = EscrowStatus::Locked;
                        holds.push(thawed);
                    }
                }
                let mut reverted = inner.campaigns.get(&dispute.campaign_id)?.clone();
                if reverted.status == CampaignStatus::Disputed {
                    drafts.push(JournalDraft::transition(
                        "campaign",
                        &reverted.id,
                        CampaignStatus::Disputed,
                        dispute.campaign_status_before,
                    ));
                    reverted.status = dispute.campaign_status_before;
                    reverted.updated_at = Utc::now();
                    campaign = Some(reverted);
                }
            }

            drafts.push(JournalDraft::transition(
                "dispute",
                dispute_id,
                dispute.status,
                DisputeStatus::Closed,
            ));
            dispute.status = DisputeStatus::Closed;
            (dispute, campaign, holds, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.disputes.put(dispute)?;
            if let Some(campaign) = campaign {
                inner.campaigns.put(campaign)?;
            }
            for hold in holds {
                inner.holds.put(hold)?;
            }
        }
        self.dispute(dispute_id)
    }
}
