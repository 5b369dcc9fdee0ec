use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::error::EngineError;
use crate::status::{BidStatus, CampaignStatus, DeliverableStatus, Platform, ProofStatus};
use crate::types::{Deliverable, ProofOfWork};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Brand verdict on a submitted draft.
#[derive(Debug, Clone)]
pub enum ReviewDecision {
    Approve,
    /// Sends the deliverable back to draft and the campaign to
    /// revision_requested.
    Reject { notes: String },
}

/// Reviewer verdict on submitted proof of work.
#[derive(Debug, Clone)]
pub enum ProofDecision {
    /// Verifies the deliverable and completes the bid in the same unit.
    Approve,
    Reject { notes: String },
    RequestRevision { notes: String },
}

/// Deliverables and proof of work, from draft to verified publication.
#[derive(Clone)]
pub struct DeliverableTracker {
    ctx: Arc<EngineContext>,
}

impl DeliverableTracker {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn deliverable(&self, deliverable_id: &str) -> Result<Deliverable, EngineError> {
        Ok(self
            .ctx
            .store
            .read()?
            .deliverables
            .get(deliverable_id)?
            .clone())
    }

    pub fn proof(&self, proof_id: &str) -> Result<ProofOfWork, EngineError> {
        Ok(self.ctx.store.read()?.proofs.get(proof_id)?.clone())
    }

    /// Start work on an accepted bid. The first deliverable moves the
    /// campaign from `accepted` to `in_progress`.
    pub async fn begin_work(
        &self,
        bid_id: &str,
        platform: Platform,
        content_type: &str,
    ) -> Result<Deliverable, EngineError> {
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (deliverable, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            let bid = inner.bids.get(bid_id)?;
            if bid.status != BidStatus::Accepted {
                return Err(EngineError::constraint(format!(
                    "bid {bid_id} is {} and cannot start work",
                    bid.status
                )));
            }
            let campaign = inner.campaigns.get(&bid.campaign_id)?.clone();
            if !matches!(
                campaign.status,
                CampaignStatus::Accepted | CampaignStatus::InProgress
            ) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    &campaign.id,
                    campaign.status.as_str(),
                    CampaignStatus::InProgress.as_str(),
                ));
            }

            let now = Utc::now();
            let deliverable = Deliverable {
                id: Uuid::new_v4().to_string(),
                campaign_id: campaign.id.clone(),
                bid_id: bid_id.to_string(),
                creator_id: bid.creator_id.clone(),
                platform,
                content_type: content_type.to_string(),
                draft_url: None,
                published_url: None,
                status: DeliverableStatus::Pending,
                reviewer_notes: None,
                version: 1,
                created_at: now,
                updated_at: now,
                verified_at: None,
            };

            let mut drafts = vec![JournalDraft::note(
                Some(format!("deliverable:{}", deliverable.id)),
                format!("work started for bid {bid_id}"),
            )];
            let campaign = if campaign.status == CampaignStatus::Accepted {
                let mut updated = campaign;
                drafts.push(JournalDraft::transition(
                    "campaign",
                    &updated.id,
                    CampaignStatus::Accepted,
                    CampaignStatus::InProgress,
                ));
                updated.status = CampaignStatus::InProgress;
                updated.updated_at = now;
                Some(updated)
            } else {
                None
            };
            (deliverable, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.deliverables.insert(deliverable.clone())?;
            if let Some(campaign) = campaign {
                inner.campaigns.put(campaign)?;
            }
        }
        Ok(deliverable)
    }

    /// Save or replace the draft. Legal from `pending` and from `rejected`
    /// (the resubmission loop).
    pub async fn save_draft(
        &self,
        deliverable_id: &str,
        draft_url: &str,
    ) -> Result<Deliverable, EngineError> {
        let op_id = operation_id();
        let snapshot = self.deliverable(deliverable_id)?;
        if !snapshot.status.can_advance(DeliverableStatus::Draft) {
            return Err(EngineError::invalid_transition(
                "deliverable",
                deliverable_id,
                snapshot.status.as_str(),
                DeliverableStatus::Draft.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (deliverable, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .deliverables
                .expect_version(deliverable_id, snapshot.version)?;
            let mut deliverable = inner.deliverables.get(deliverable_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "deliverable",
                deliverable_id,
                deliverable.status,
                DeliverableStatus::Draft,
            )];
            deliverable.status = DeliverableStatus::Draft;
            deliverable.draft_url = Some(draft_url.to_string());
            deliverable.updated_at = Utc::now();
            (deliverable, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.deliverables.put(deliverable)?;
        self.deliverable(deliverable_id)
    }

    /// Submit the draft for brand review; the campaign follows to
    /// `draft_submitted`.
    pub async fn submit(&self, deliverable_id: &str) -> Result<Deliverable, EngineError> {
        let op_id = operation_id();
        let snapshot = self.deliverable(deliverable_id)?;
        if !snapshot.status.can_advance(DeliverableStatus::Submitted) {
            return Err(EngineError::invalid_transition(
                "deliverable",
                deliverable_id,
                snapshot.status.as_str(),
                DeliverableStatus::Submitted.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (deliverable, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .deliverables
                .expect_version(deliverable_id, snapshot.version)?;
            let mut deliverable = inner.deliverables.get(deliverable_id)?.clone();
            let mut campaign = inner.campaigns.get(&deliverable.campaign_id)?.clone();
            if !campaign.status.can_advance(CampaignStatus::DraftSubmitted) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    &campaign.id,
                    campaign.status.as_str(),
                    CampaignStatus::DraftSubmitted.as_str(),
                ));
            }

            let now = Utc::now();
            let drafts = vec![
                JournalDraft::transition(
                    "deliverable",
                    deliverable_id,
                    deliverable.status,
                    DeliverableStatus::Submitted,
                ),
                JournalDraft::transition(
                    "campaign",
                    &campaign.id,
                    campaign.status,
                    CampaignStatus::DraftSubmitted,
                ),
            ];
            deliverable.status = DeliverableStatus::Submitted;
            deliverable.updated_at = now;
            campaign.status = CampaignStatus::DraftSubmitted;
            campaign.updated_at = now;
            (deliverable, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.deliverables.put(deliverable)?;
            inner.campaigns.put(campaign)?;
        }
        self.deliverable(deliverable_id)
    }

    /// Brand review of a submitted draft.
    pub async fn review(
        &self,
        deliverable_id: &str,
        decision: ReviewDecision,
    ) -> Result<Deliverable, EngineError> {
        let op_id = operation_id();
        let snapshot = self.deliverable(deliverable_id)?;
        let (target, campaign_target, notes) = match decision {
            ReviewDecision::Approve => (
                DeliverableStatus::Approved,
                CampaignStatus::DraftApproved,
                None,
            ),
            ReviewDecision::Reject { notes } => (
                DeliverableStatus::Rejected,
                CampaignStatus::RevisionRequested,
                Some(notes),
            ),
        };
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "deliverable",
                deliverable_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (deliverable, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .deliverables
                .expect_version(deliverable_id, snapshot.version)?;
            let mut deliverable = inner.deliverables.get(deliverable_id)?.clone();
            let mut campaign = inner.campaigns.get(&deliverable.campaign_id)?.clone();
            if !campaign.status.can_advance(campaign_target) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    &campaign.id,
                    campaign.status.as_str(),
                    campaign_target.as_str(),
                ));
            }

            let now = Utc::now();
            let drafts = vec![
                JournalDraft::transition(
                    "deliverable",
                    deliverable_id,
                    deliverable.status,
                    target,
                ),
                JournalDraft::transition(
                    "campaign",
                    &campaign.id,
                    campaign.status,
                    campaign_target,
                ),
            ];
            deliverable.status = target;
            deliverable.reviewer_notes = notes;
            deliverable.updated_at = now;
            campaign.status = campaign_target;
            campaign.updated_at = now;
            (deliverable, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.deliverables.put(deliverable)?;
            inner.campaigns.put(campaign)?;
        }
        self.deliverable(deliverable_id)
    }

    /// Record publication of an approved deliverable.
    pub async fn publish(
        &self,
        deliverable_id: &str,
        published_url: &str,
    ) -> Result<Deliverable, EngineError> {
        let op_id = operation_id();
        let snapshot = self.deliverable(deliverable_id)?;
        if !snapshot.status.can_advance(DeliverableStatus::Published) {
            return Err(EngineError::invalid_transition(
                "deliverable",
                deliverable_id,
                snapshot.status.as_str(),
                DeliverableStatus::Published.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (deliverable, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            inner
                .deliverables
                .expect_version(deliverable_id, snapshot.version)?;
            let mut deliverable = inner.deliverables.get(deliverable_id)?.clone();
            let mut campaign = inner.campaigns.get(&deliverable.campaign_id)?.clone();
            if !campaign.status.can_advance(CampaignStatus::Published) {
                return Err(EngineError::invalid_transition(
                    "campaign",
                    &campaign.id,
                    campaign.status.as_str(),
                    CampaignStatus::Published.as_str(),
                ));
            }

            let now = Utc::now();
            let drafts = vec![
                JournalDraft::transition(
                    "deliverable",
                    deliverable_id,
                    deliverable.status,
                    DeliverableStatus::Published,
                ),
                JournalDraft::transition(
                    "campaign",
                    &campaign.id,
                    campaign.status,
                    CampaignStatus::Published,
                ),
            ];
            deliverable.status = DeliverableStatus::Published;
            deliverable.published_url = Some(published_url.to_string());
            deliverable.updated_at = now;
            campaign.status = CampaignStatus::Published;
            campaign.updated_at = now;
            (deliverable, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.deliverables.put(deliverable)?;
            inner.campaigns.put(campaign)?;
        }
        self.deliverable(deliverable_id)
    }

    /// Submit proof that the published deliverable ran as agreed; the
    /// campaign enters `pending_review`.
    pub async fn submit_proof(
        &self,
        bid_id: &str,
        title: &str,
        content_links: Vec<String>,
    ) -> Result<ProofOfWork, EngineError> {
        if content_links.is_empty() {
            return Err(EngineError::constraint("proof needs at least one link"));
        }
        let op_id = operation_id();

        let _lane = self.ctx.write_lane.lock().await;
        let (proof, campaign, drafts) = {
            let inner = self.ctx.store.read()?;
            let bid = inner.bids.get(bid_id)?;
            if bid.status != BidStatus::Accepted {
                return Err(EngineError::constraint(format!(
                    "bid {bid_id} is {} and cannot submit proof",
                    bid.status
                )));
            }
            let published = inner
                .deliverables_for_bid(bid_id)
                .iter()
                .any(|d| d.status == DeliverableStatus::Published);
            if !published {
                return Err(EngineError::VerificationRequired(format!(
                    "bid {bid_id} has no published deliverable"
                )));
            }
            let open_proof = inner
                .proofs
                .values()
                .any(|p| p.bid_id == bid_id && p.status == ProofStatus::Pending);
            if open_proof {
                return Err(EngineError::constraint(format!(
                    "bid {bid_id} already has proof awaiting review"
                )));
            }

            let campaign = inner.campaigns.get(&bid.campaign_id)?.clone();
            let now = Utc::now();
            let proof = ProofOfWork {
                id: Uuid::new_v4().to_string(),
                bid_id: bid_id.to_string(),
                campaign_id: campaign.id.clone(),
                creator_id: bid.creator_id.clone(),
                title: title.to_string(),
                content_links,
                status: ProofStatus::Pending,
                reviewer_notes: None,
                version: 1,
                submitted_at: now,
                reviewed_at: None,
            };

            let mut drafts = vec![JournalDraft::note(
                Some(format!("proof_of_work:{}", proof.id)),
                format!("proof submitted for bid {bid_id}"),
            )];
            let campaign = if campaign.status == CampaignStatus::Published {
                let mut updated = campaign;
                drafts.push(JournalDraft::transition(
                    "campaign",
                    &updated.id,
                    CampaignStatus::Published,
                    CampaignStatus::PendingReview,
                ));
                updated.status = CampaignStatus::PendingReview;
                updated.updated_at = now;
                Some(updated)
            } else {
                None
            };
            (proof, campaign, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.proofs.insert(proof.clone())?;
            if let Some(campaign) = campaign {
                inner.campaigns.put(campaign)?;
            }
        }
        Ok(proof)
    }

    /// Review submitted proof. Approval verifies the published deliverable
    /// and completes the bid in the same atomic unit, which is what makes
    /// the bid eligible for escrow release.
    pub async fn review_proof(
        &self,
        proof_id: &str,
        decision: ProofDecision,
    ) -> Result<ProofOfWork, EngineError> {
        let op_id = operation_id();
        let snapshot = self.proof(proof_id)?;
        let (target, notes) = match &decision {
            ProofDecision::Approve => (ProofStatus::Approved, None),
            ProofDecision::Reject { notes } => (ProofStatus::Rejected, Some(notes.clone())),
            ProofDecision::RequestRevision { notes } => {
                (ProofStatus::RevisionRequested, Some(notes.clone()))
            }
        };
        if !snapshot.status.can_advance(target) {
            return Err(EngineError::invalid_transition(
                "proof_of_work",
                proof_id,
                snapshot.status.as_str(),
                target.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (proof, deliverable, bid, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.proofs.expect_version(proof_id, snapshot.version)?;
            let mut proof = inner.proofs.get(proof_id)?.clone();
            let now = Utc::now();
            let mut drafts = vec![JournalDraft::transition(
                "proof_of_work",
                proof_id,
                proof.status,
                target,
            )];
            proof.status = target;
            proof.reviewer_notes = notes;
            proof.reviewed_at = Some(now);

            let mut deliverable = None;
            let mut bid = None;
            if matches!(decision, ProofDecision::Approve) {
                let published = inner
                    .deliverables_for_bid(&proof.bid_id)
                    .into_iter()
                    .find(|d| d.status == DeliverableStatus::Published)
                    .cloned();
                let mut verified = published.ok_or_else(|| {
                    EngineError::VerificationRequired(format!(
                        "bid {} has no published deliverable to verify",
                        proof.bid_id
                    ))
                })?;
                drafts.push(JournalDraft::transition(
                    "deliverable",
                    &verified.id,
                    DeliverableStatus::Published,
                    DeliverableStatus::Verified,
                ));
                verified.status = DeliverableStatus::Verified;
                verified.verified_at = Some(now);
                verified.updated_at = now;
                deliverable = Some(verified);

                let mut completed = inner.bids.get(&proof.bid_id)?.clone();
                if completed.status != BidStatus::Accepted {
                    return Err(EngineError::invalid_transition(
                        "bid",
                        &completed.id,
                        completed.status.as_str(),
                        BidStatus::Completed.as_str(),
                    ));
                }
                drafts.push(JournalDraft::transition(
                    "bid",
                    &completed.id,
                    BidStatus::Accepted,
                    BidStatus::Completed,
                ));
                completed.status = BidStatus::Completed;
                completed.updated_at = now;
                bid = Some(completed);
            }
            (proof, deliverable, bid, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        {
            let mut inner = self.ctx.store.write()?;
            inner.proofs.put(proof)?;
            if let Some(deliverable) = deliverable {
                inner.deliverables.put(deliverable)?;
            }
            if let Some(bid) = bid {
                inner.bids.put(bid)?;
            }
        }
        info!(proof_id, "proof reviewed");
        self.proof(proof_id)
    }

    /// Resubmit rejected or revision-requested proof with fresh links.
    pub async fn resubmit_proof(
        &self,
        proof_id: &str,
        content_links: Vec<String>,
    ) -> Result<ProofOfWork, EngineError> {
        if content_links.is_empty() {
            return Err(EngineError::constraint("proof needs at least one link"));
        }
        let op_id = operation_id();
        let snapshot = self.proof(proof_id)?;
        if !snapshot.status.can_advance(ProofStatus::Pending) {
            return Err(EngineError::invalid_transition(
                "proof_of_work",
                proof_id,
                snapshot.status.as_str(),
                ProofStatus::Pending.as_str(),
            ));
        }

        let _lane = self.ctx.write_lane.lock().await;
        let (proof, drafts) = {
            let inner = self.ctx.store.read()?;
            inner.proofs.expect_version(proof_id, snapshot.version)?;
            let mut proof = inner.proofs.get(proof_id)?.clone();
            let drafts = vec![JournalDraft::transition(
                "proof_of_work",
                proof_id,
                proof.status,
                ProofStatus::Pending,
            )];
            proof.status = ProofStatus::Pending;
            proof.content_links = content_links;
            proof.submitted_at = Utc::now();
            (proof, drafts)
        };

        self.ctx.journal_all(&op_id, drafts).await?;
        self.ctx.store.write()?.proofs.put(proof)?;
        self.proof(proof_id)
    }
}
