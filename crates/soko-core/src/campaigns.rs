use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::notify::{NotificationEvent, NotificationKind};
use crate::status::{
    BidStatus, CampaignStatus, ContentStatus, PackageStatus, Platform, VerificationStatus,
};
use crate::types::{AmountMinor, Bid, Campaign, CampaignContent};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Reject every still-pending bid on a campaign that is leaving the bidding
/// phase for good. Returns the mutated bid copies for the caller to apply.
pub(crate) fn reject_pending_bids(
    inner: &crate::store::StoreInner,
    campaign_id: &str,
    drafts: &mut Vec<JournalDraft>,
    now: chrono::DateTime<Utc>,
) -> Vec<Bid> {
    let mut rejected = Vec::new();
    for bid in inner.bids_for_campaign(campaign_id) {
        if bid.status == BidStatus::Pending {
            let mut bid = bid.clone();
            drafts.push(JournalDraft::transition(
                "bid",
                &bid.id,
                BidStatus::Pending,
                BidStatus::Rejected,
            ));
            bid.status = BidStatus::Rejected;
            bid.updated_at = now;
            rejected.push(bid);
        }
    }
    rejected
}

/// Campaign-level state machine layered over bids, deliverables, and escrow.
///
/// The orchestrator reads the other managers' state to validate its own
/// transitions but never settles escrow or moves a bid itself.
#[derive(Clone)]
pub struct CampaignOrchestrator {
    ctx: Arc<EngineContext>,
}

impl CampaignOrchestrator {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn campaign(&self, campaign_id: &str) -> Result<Campaign, EngineError> {
        Ok(self.ctx.store.read()?.campaigns.get(campaign_id)?.clone())
    }

    pub fn content(&self, content_id: &str) -> Result<CampaignContent, EngineError> {
        Ok(self.ctx.store.read()?.contents.get(content_id)?.clone())
    }

    /// Publish a brief for open bidding.
    pub async fn create_brief(
        &self,
        brand_id: &str,
        title: &str,
        budget_minor: AmountMinor,
        platforms: Vec<Platform>,
    ) -> Result<Campaign, EngineError> {
        if budget_minor <= 0 {
            return Err(EngineError::constraint("campaign budget must be positive"));
        }
        if platforms.is_empty() {
            return Err(EngineError::constraint(
                "campaign needs at least one platform",
            ));
        }
        let op_id = operation_id();
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            brand_id: brand_id.to_string(),
            title: title.to_string(),
            budget_minor,
            platforms,
            creator_id: None,
            package_id: None,
            status: CampaignStatus::Open,
            version: 1,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let _lane = self.ctx.write_lane.lock().await;
        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("campaign:{}", campaign.id)),
                    format!("campaign opened by brand {brand_id}"),
                )],
            )
            .await?;
        self.ctx.store.write()?.campaigns.insert(campaign.clone())?;
        info!(campaign_id = %campaign.id, "campaign opened");
        Ok(campaign)
    }

    /// Direct purchase of a creator package: creates a pending campaign
    /// already assigned to the creator, plus the creator's bid at the
    /// package price. The brand confirms by accepting that bid.
    pub async fn order_package(
        &self,
        brand_id: &str,
        package_id: &str,
        title: &str,
    ) -> Result<(Campaign, Bid), EngineError> {
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (campaign, bid) = {
            let inner = self.ctx.store.read()?;
            let package = inner.packages.get(package_id)?;
            if package.status != PackageStatus::Active {
                return Err(EngineError::constraint(format!(
                    "package {package_id} is {} and cannot be ordered",
                    package.status
                )));
            }
            let profile = inner.profiles.get(&package.creator_id)?;
            if profile.verification_status != VerificationStatus::Approved {
                return Err(EngineError::VerificationRequired(format!(
                    "creator {} is {} and cannot take orders",
                    package.creator_id, profile.verification_status
                )));
            }

            let now = Utc::now();
            let campaign = Campaign {
                id: Uuid::new_v4().to_string(),
                brand_id: brand_id.to_string(),
                title: title.to_string(),
                budget_minor: package.price_minor,
                platforms: vec![package.platform],
                creator_id: Some(package.creator_id.clone()),
                package_id: Some(package_id.to_string()),
                status: CampaignStatus::Pending,
                version: 1,
                created_at: now,
                updated_at: now,
                completed_at: None,
            };
            let bid = Bid {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign.id.clone(),
                creator_id: package.creator_id.clone(),
                amount_minor: package.price_minor,
                message: None,
                package_id: Some(package_id.to_string()),
                status: BidStatus::Pending,
                escrow_hold_id: None,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            (campaign, bid)
        };

        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("campaign:{}", campaign.id)),
                    format!("package {package_id} ordered by brand {brand_id}"),
                )],
            )
            .await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.campaigns.insert(campaign.clone())?;
            inner.bids.insert(bid.clone())?;
        }
        Ok((campaign, bid))
    }

    /// Brand-initiated cancellation; blocked while escrow is still locked.
    pub async fn cancel(&self, campaign_id: &str) -> Result<Campaign, EngineError> {
        let op_id = operation_id();
        let snapshot = self.campaign(campaign_id)?;
        if !snapshot.status.can_advance(CampaignStatus::Cancelled) {
            return Err(EngineError::invalid_transition(
                "campaign",
                campaign_id,
                snapshot.status.as_str(),
                CampaignStatus::Cancelled.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (campaign, bids, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .campaigns
                .expect_version(campaign_id, snapshot.version)?;
            crate::guard::check_campaign_can_cancel(&inner, campaign_id)?;
            let mut campaign = inner.campaigns.get(campaign_id)?.clone();
            let mut drafts = vec![JournalDraft::transition(
                "campaign",
                campaign_id,
                campaign.status,
                CampaignStatus::Cancelled,
            )];
            let now = Utc::now();
            let bids = reject_pending_bids(&inner, campaign_id, &mut drafts, now);
            campaign.status = CampaignStatus::Cancelled;
            campaign.updated_at = now;
            (campaign, bids, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.campaigns.put(campaign)?;
            for bid in bids {
                inner.bids.put(bid)?;
            }
        }
        drop(_lane);
        info!(campaign_id, "campaign cancelled");
        self.ctx
            .emit(NotificationEvent::new(
                NotificationKind::CampaignCancelled,
                campaign_id,
                Some(campaign_id.to_string()),
                "campaign cancelled by brand",
            ))
            .await;
        self.campaign(campaign_id)
    }

    /// Final acceptance of the engagement, from `pending_review` only and
    /// only once all bids are terminal and no dispute is open.
    pub async fn complete(&self, campaign_id: &str) -> Result<Campaign, EngineError> {
        let op_id = operation_id();
        let snapshot = self.campaign(campaign_id)?;
        if !snapshot.status.can_advance(CampaignStatus::Completed)
            || snapshot.status != CampaignStatus::PendingReview
        {
            return Err(EngineError::invalid_transition(
                "campaign",
                campaign_id,
                snapshot.status.as_str(),
                CampaignStatus::Completed.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .campaigns
                .expect_version(campaign_id, snapshot.version)?;
            crate::guard::check_campaign_can_complete(&inner, campaign_id)?;
            let mut campaign = inner.campaigns.get(campaign_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "campaign",
                campaign_id,
                campaign.status,
                CampaignStatus::Completed,
            )];
            let now = Utc::now();
            campaign.status = CampaignStatus::Completed;
            campaign.completed_at = Some(now);
            campaign.updated_at = now;
            (campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.campaigns.put(campaign)?;
        drop(_lane);
        info!(campaign_id, "campaign completed");
        self.ctx
            .emit(NotificationEvent::new(
                NotificationKind::CampaignCompleted,
                campaign_id,
                Some(campaign_id.to_string()),
                "campaign completed",
            ))
            .await;
        self.campaign(campaign_id)
    }

    /// Administrative closure of a finished or never-awarded campaign.
    pub async fn close(&self, campaign_id: &str) -> Result<Campaign, EngineError> {
        let op_id = operation_id();
        let snapshot = self.campaign(campaign_id)?;
        if !snapshot.status.can_advance(CampaignStatus::Closed) {
            return Err(EngineError::invalid_transition(
                "campaign",
                campaign_id,
                snapshot.status.as_str(),
                CampaignStatus::Closed.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (campaign, bids, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .campaigns
                .expect_version(campaign_id, snapshot.version)?;
            let mut campaign = inner.campaigns.get(campaign_id)?.clone();
            let mut drafts = vec![JournalDraft::transition(
                "campaign",
                campaign_id,
                campaign.status,
                CampaignStatus::Closed,
            )];
            let now = Utc::now();
            let bids = reject_pending_bids(&inner, campaign_id, &mut drafts, now);
            campaign.status = CampaignStatus::Closed;
            campaign.updated_at = now;
            (campaign, bids, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.campaigns.put(campaign)?;
            for bid in bids {
                inner.bids.put(bid)?;
            }
        }
        self.campaign(campaign_id)
    }

    /// Add a content item to a campaign's approval track.
    pub async fn add_content(
        &self,
        campaign_id: &str,
        topic: &str,
        platform: Option<Platform>,
    ) -> Result<CampaignContent, EngineError> {
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let content = {
            let inner = self.ctx.store.read()?;
            let campaign = inner.campaigns.get(campaign_id)?;
            if campaign.status.is_terminal() {
                return Err(EngineError::constraint(format!(
                    "campaign {campaign_id} is closed"
                )));
            }
            let now = Utc::now();
            CampaignContent {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign_id.to_string(),
                topic: topic.to_string(),
                platform,
                status: ContentStatus::Draft,
                version: 1,
                created_at: now,
                updated_at: now,
            }
        };

        self.ctx
            .journal_all(
                &op_id,
                vec![JournalDraft::note(
                    Some(format!("campaign_content:{}", content.id)),
                    format!("content drafted for campaign {campaign_id}"),
                )],
            )
            .await?;
        self.ctx.store.write()?.contents.insert(content.clone())?;
        Ok(content)
    }

    pub async fn advance_content(
        &self,
        content_id: &str,
        target: ContentStatus,
    ) -> Result<CampaignContent, EngineError> {
        let op_id = operation_id();
        let snapshot = self.content(content_id)?;
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "campaign_content",
                content_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (content, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.contents.expect_version(content_id, snapshot.version)?;
            let mut content = inner.contents.get(content_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "campaign_content",
                content_id,
                content.status,
                target,
            )];
            content.status = target;
            content.updated_at = Utc::now();
            (content, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.contents.put(content)?;
        self.content(content_id)
    }
}
