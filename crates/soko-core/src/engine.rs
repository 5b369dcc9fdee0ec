use crate::bids::BidManager;
use crate::campaigns::CampaignOrchestrator;
use crate::context::{operation_id, EngineContext, JournalDraft};
use crate::deliverables::DeliverableTracker;
use crate::disputes::DisputeResolver;
use crate::error::EngineError;
use crate::escrow::EscrowManager;
use crate::journal::JournalEntry;
use crate::ledger::LedgerStore;
use crate::notify::{NotificationEvent, NotificationKind, NotificationSink};
use crate::payout::{PayoutConnector, PayoutInstruction};
use crate::profiles::CreatorRegistry;
use crate::status::{TransactionStatus, TransactionType};
use crate::storage::{JournalStorageConfig, PersistentJournal};
use crate::types::{WalletAccount, WalletTransaction};
use std::sync::Arc;
use tracing::{info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub currency: String,
    pub platform_fee_percent: u8,
    pub auto_release_days: i64,
    pub platform_owner_id: String,
    pub journal_storage: JournalStorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "KES".to_string(),
            platform_fee_percent: 10,
            auto_release_days: 14,
            platform_owner_id: "soko-platform".to_string(),
            journal_storage: JournalStorageConfig::Memory,
        }
    }
}

/// Marketplace engine composing the wallet ledger, escrow, bids,
/// deliverables, campaigns and disputes over one shared store and journal.
#[derive(Clone)]
pub struct MarketEngine {
    ctx: Arc<EngineContext>,
    ledger: LedgerStore,
    escrow: EscrowManager,
    bids: BidManager,
    deliverables: DeliverableTracker,
    campaigns: CampaignOrchestrator,
    disputes: DisputeResolver,
    creators: CreatorRegistry,
}

impl MarketEngine {
    /// Bootstrap the engine: open the journal backend and create the
    /// platform revenue account that collects fees.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self, EngineError> {
        let journal = PersistentJournal::bootstrap(config.journal_storage.clone()).await?;
        let platform_owner = config.platform_owner_id.clone();
        let ctx = Arc::new(EngineContext::new(config, journal));

        let engine = Self {
            ledger: LedgerStore::new(ctx.clone()),
            escrow: EscrowManager::new(ctx.clone()),
            bids: BidManager::new(ctx.clone()),
            deliverables: DeliverableTracker::new(ctx.clone()),
            campaigns: CampaignOrchestrator::new(ctx.clone()),
            disputes: DisputeResolver::new(ctx.clone()),
            creators: CreatorRegistry::new(ctx.clone()),
            ctx,
        };

        let platform = engine.ledger.create_account(&platform_owner, None).await?;
        *engine
            .ctx
            .platform_account_id
            .write()
            .map_err(|_| EngineError::LockPoisoned)? = Some(platform.id.clone());
        let backend = engine.ctx.journal.lock().await.backend_label();
        info!(platform_account_id = %platform.id, backend, "market engine ready");
        Ok(engine)
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn escrow(&self) -> &EscrowManager {
        &self.escrow
    }

    pub fn bids(&self) -> &BidManager {
        &self.bids
    }

    pub fn deliverables(&self) -> &DeliverableTracker {
        &self.deliverables
    }

    pub fn campaigns(&self) -> &CampaignOrchestrator {
        &self.campaigns
    }

    pub fn disputes(&self) -> &DisputeResolver {
        &self.disputes
    }

    pub fn creators(&self) -> &CreatorRegistry {
        &self.creators
    }

    /// Wallet account holding accumulated platform fees.
    pub fn platform_account(&self) -> Result<WalletAccount, EngineError> {
        self.ledger.account(&self.ctx.platform_account_id()?)
    }

    pub fn register_sink(&self, sink: Arc<dyn NotificationSink>) -> Result<(), EngineError> {
        self.ctx
            .sinks
            .write()
            .map_err(|_| EngineError::LockPoisoned)?
            .push(sink);
        Ok(())
    }

    pub fn register_payout_connector(
        &self,
        connector: Arc<dyn PayoutConnector>,
    ) -> Result<(), EngineError> {
        self.ctx
            .payouts
            .write()
            .map_err(|_| EngineError::LockPoisoned)?
            .register(connector);
        Ok(())
    }

    /// Drive a pending withdrawal through its rail connector. The
    /// transaction moves to `processing` before the connector runs, then to
    /// `completed` or `failed` depending on what the rail reports. Either
    /// terminal state releases the reserved funds.
    pub async fn process_withdrawal(
        &self,
        tx_id: &str,
    ) -> Result<WalletTransaction, EngineError> {
        let tx = self.ledger.transaction(tx_id)?;
        if tx.tx_type != TransactionType::Withdrawal {
            return Err(EngineError::constraint(format!(
                "transaction {tx_id} is a {} and cannot be processed as a withdrawal",
                tx.tx_type
            )));
        }
        if tx.status != TransactionStatus::Pending {
            return Err(EngineError::invalid_transition(
                "wallet_transaction",
                tx_id,
                tx.status.as_str(),
                TransactionStatus::Processing.as_str(),
            ));
        }
        let rail = tx
            .rail
            .ok_or_else(|| EngineError::constraint(format!("withdrawal {tx_id} has no rail")))?;
        let connector = self
            .ctx
            .payouts
            .read()
            .map_err(|_| EngineError::LockPoisoned)?
            .get(rail)
            .ok_or_else(|| {
                EngineError::constraint(format!("no payout connector registered for {rail}"))
            })?;

        let instruction = {
            let inner = self.ctx.store.read()?;
            let account = inner.accounts.get(&tx.account_id)?;
            let method = inner
                .payment_methods
                .values()
                .find(|m| m.account_id == tx.account_id && m.kind == rail)
                .ok_or_else(|| {
                    EngineError::constraint(format!(
                        "account {} has no {rail} payout destination",
                        tx.account_id
                    ))
                })?;
            PayoutInstruction {
                transaction_id: tx.id.clone(),
                account_id: tx.account_id.clone(),
                rail,
                destination: method.destination.clone(),
                amount_minor: -tx.amount_minor,
                currency: account.currency.clone(),
            }
        };

        self.ledger
            .advance(tx_id, TransactionStatus::Processing)
            .await?;

        match connector.execute(&instruction).await {
            Ok(receipt) => {
                let tx = self
                    .ledger
                    .advance(tx_id, TransactionStatus::Completed)
                    .await?;
                let op_id = operation_id();
                self.ctx
                    .journal_all(
                        &op_id,
                        vec![JournalDraft::note(
                            Some(format!("wallet_transaction:{tx_id}")),
                            format!("payout settled on {} ref {}", receipt.rail, receipt.reference),
                        )],
                    )
                    .await?;
                self.ctx
                    .emit(NotificationEvent::new(
                        NotificationKind::WithdrawalCompleted,
                        tx_id,
                        None,
                        format!("withdrawal settled via {}", receipt.rail),
                    ))
                    .await;
                Ok(tx)
            }
            Err(err) => {
                warn!(tx_id, %err, "payout connector failed, failing withdrawal");
                self.ledger
                    .advance(tx_id, TransactionStatus::Failed)
                    .await?;
                Err(err)
            }
        }
    }

    /// Full-store audit: every balance must reconstruct from its completed
    /// transactions and cross-entity references must hold.
    pub fn verify_consistency(&self) -> Result<(), EngineError> {
        let inner = self.ctx.store.read()?;
        crate::guard::check_store(&inner)
    }

    /// Recompute the journal's hash chain.
    pub async fn verify_journal(&self) -> bool {
        self.ctx.journal.lock().await.verify_chain()
    }

    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        self.ctx.journal.lock().await.entries().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliverables::{ProofDecision, ReviewDecision};
    use crate::disputes::DisputeOutcome;
    use crate::payout::PayoutReceipt;
    use crate::status::{
        BidStatus, CampaignStatus, DisputeStatus, EscrowStatus, PaymentMethodKind, Platform,
    };
    use crate::types::{Bid, Campaign, CreatorProfile, EscrowHold, WalletAccount};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    async fn engine_with_fee(platform_fee_percent: u8) -> MarketEngine {
        MarketEngine::bootstrap(EngineConfig {
            platform_fee_percent,
            ..EngineConfig::default()
        })
        .await
        .unwrap()
    }

    async fn approved_creator(engine: &MarketEngine, name: &str) -> CreatorProfile {
        let profile = engine.creators().register(name).await.unwrap();
        engine.creators().review(&profile.id, true).await.unwrap()
    }

    async fn funded_brand(engine: &MarketEngine, owner: &str, amount: i64) -> WalletAccount {
        let account = engine.ledger().create_account(owner, None).await.unwrap();
        engine
            .ledger()
            .deposit(&account.id, amount, PaymentMethodKind::Mpesa)
            .await
            .unwrap();
        engine.ledger().account(&account.id).unwrap()
    }

    /// Campaign with one accepted bid; returns the locked hold alongside.
    async fn accepted_bid(
        engine: &MarketEngine,
        brand: &str,
        creator: &CreatorProfile,
        amount: i64,
    ) -> (Campaign, Bid, EscrowHold) {
        let campaign = engine
            .campaigns()
            .create_brief(brand, "launch video", amount, vec![Platform::Tiktok])
            .await
            .unwrap();
        let bid = engine
            .bids()
            .place(&campaign.id, &creator.id, amount, None)
            .await
            .unwrap();
        let bid = engine.bids().accept(&bid.id).await.unwrap();
        let hold = engine
            .escrow()
            .hold(bid.escrow_hold_id.as_deref().unwrap())
            .unwrap();
        let campaign = engine.campaigns().campaign(&campaign.id).unwrap();
        (campaign, bid, hold)
    }

    /// Drive a bid's deliverable through draft, approval, publication and
    /// proof review so the bid completes and its escrow may release.
    async fn complete_work(engine: &MarketEngine, bid: &Bid) {
        let deliverable = engine
            .deliverables()
            .begin_work(&bid.id, Platform::Tiktok, "video")
            .await
            .unwrap();
        engine
            .deliverables()
            .save_draft(&deliverable.id, "https://cdn.example/draft.mp4")
            .await
            .unwrap();
        engine.deliverables().submit(&deliverable.id).await.unwrap();
        engine
            .deliverables()
            .review(&deliverable.id, ReviewDecision::Approve)
            .await
            .unwrap();
        engine
            .deliverables()
            .publish(&deliverable.id, "https://tiktok.com/@c/video/1")
            .await
            .unwrap();
        let proof = engine
            .deliverables()
            .submit_proof(&bid.id, "launch video live", vec![
                "https://tiktok.com/@c/video/1".to_string(),
            ])
            .await
            .unwrap();
        engine
            .deliverables()
            .review_proof(&proof.id, ProofDecision::Approve)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn escrow_lock_release_pays_creator_once() {
        let engine = engine_with_fee(0).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        let brand = funded_brand(&engine, "acme", 1_000).await;
        let (_, bid, hold) = accepted_bid(&engine, "acme", &creator, 1_000).await;

        // locking debits the brand immediately
        assert_eq!(engine.ledger().account(&brand.id).unwrap().balance_minor, 0);
        assert_eq!(hold.status, EscrowStatus::Locked);

        // release is gated on a verified deliverable
        let err = engine.escrow().release(&hold.id).await.unwrap_err();
        assert!(matches!(err, EngineError::VerificationRequired(_)));

        complete_work(&engine, &bid).await;
        let released = engine.escrow().release(&hold.id).await.unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(engine.bids().bid(&bid.id).unwrap().status, BidStatus::Paid);

        let payee = engine.ledger().account_for_owner(&creator.id).unwrap();
        assert_eq!(payee.balance_minor, 1_000);

        // a released hold cannot pay twice
        let err = engine.escrow().release(&hold.id).await.unwrap_err();
        assert!(matches!(err, EngineError::IllegalHoldState { .. }));
        let payee = engine.ledger().account_for_owner(&creator.id).unwrap();
        assert_eq!(payee.balance_minor, 1_000);
        assert_eq!(engine.ledger().account(&brand.id).unwrap().balance_minor, 0);

        engine.verify_consistency().unwrap();
        assert!(engine.verify_journal().await);
    }

    #[tokio::test]
    async fn release_splits_platform_fee() {
        let engine = engine_with_fee(10).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        funded_brand(&engine, "acme", 2_000).await;
        let (_, bid, hold) = accepted_bid(&engine, "acme", &creator, 2_000).await;

        complete_work(&engine, &bid).await;
        engine.escrow().release(&hold.id).await.unwrap();

        let payee = engine.ledger().account_for_owner(&creator.id).unwrap();
        assert_eq!(payee.balance_minor, 1_800);
        assert_eq!(payee.total_earned_minor, 1_800);
        assert_eq!(engine.platform_account().unwrap().balance_minor, 200);
        engine.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn concurrent_accept_loses_exactly_once() {
        let engine = engine_with_fee(0).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        funded_brand(&engine, "acme", 1_000).await;
        let campaign = engine
            .campaigns()
            .create_brief("acme", "launch video", 1_000, vec![Platform::Tiktok])
            .await
            .unwrap();
        let bid = engine
            .bids()
            .place(&campaign.id, &creator.id, 1_000, None)
            .await
            .unwrap();

        // Park both accepts behind the write lane so each snapshots the bid
        // at the same version before either can commit.
        let lane = engine.ctx.write_lane.lock().await;
        let (b1, id1) = (engine.bids().clone(), bid.id.clone());
        let (b2, id2) = (engine.bids().clone(), bid.id.clone());
        let first = tokio::spawn(async move { b1.accept(&id1).await });
        let second = tokio::spawn(async move { b2.accept(&id2).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        drop(lane);

        let results = [first.await.unwrap(), second.await.unwrap()];
        let won = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(won, 1);
        let lost = results
            .iter()
            .filter(|r| {
                matches!(r, Err(EngineError::ConcurrentModification { .. }))
            })
            .count();
        assert_eq!(lost, 1);

        // exactly one hold was locked
        let holds = engine.escrow().holds_for_campaign(&campaign.id).unwrap();
        assert_eq!(holds.len(), 1);
        engine.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn cancel_blocked_until_escrow_refunded() {
        let engine = engine_with_fee(0).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        let brand = funded_brand(&engine, "acme", 1_000).await;
        let (campaign, _, hold) = accepted_bid(&engine, "acme", &creator, 1_000).await;

        let err = engine.campaigns().cancel(&campaign.id).await.unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));

        let refunded = engine.escrow().refund(&hold.id).await.unwrap();
        assert_eq!(refunded.status, EscrowStatus::Refunded);
        assert_eq!(
            engine.ledger().account(&brand.id).unwrap().balance_minor,
            1_000
        );

        let cancelled = engine.campaigns().cancel(&campaign.id).await.unwrap();
        assert_eq!(cancelled.status, CampaignStatus::Cancelled);
        engine.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn dispute_refund_returns_every_locked_hold() {
        let engine = engine_with_fee(0).await;
        let first = approved_creator(&engine, "wanjiku").await;
        let second = approved_creator(&engine, "otieno").await;
        let brand = funded_brand(&engine, "acme", 2_000).await;

        let campaign = engine
            .campaigns()
            .create_brief("acme", "duo campaign", 2_000, vec![Platform::Instagram])
            .await
            .unwrap();
        let bid_a = engine
            .bids()
            .place(&campaign.id, &first.id, 800, None)
            .await
            .unwrap();
        let bid_b = engine
            .bids()
            .place(&campaign.id, &second.id, 1_200, None)
            .await
            .unwrap();
        engine.bids().accept(&bid_a.id).await.unwrap();
        engine.bids().accept(&bid_b.id).await.unwrap();
        assert_eq!(engine.ledger().account(&brand.id).unwrap().balance_minor, 0);

        let dispute = engine
            .disputes()
            .open(&campaign.id, "acme", "neither post went live")
            .await
            .unwrap();
        for hold in engine.escrow().holds_for_campaign(&campaign.id).unwrap() {
            assert_eq!(hold.status, EscrowStatus::Disputed);
        }
        assert_eq!(
            engine.campaigns().campaign(&campaign.id).unwrap().status,
            CampaignStatus::Disputed
        );

        engine.disputes().begin_review(&dispute.id).await.unwrap();
        let resolved = engine
            .disputes()
            .resolve(
                &dispute.id,
                DisputeOutcome::RefundToBrand,
                "no deliverables produced",
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);

        for hold in engine.escrow().holds_for_campaign(&campaign.id).unwrap() {
            assert_eq!(hold.status, EscrowStatus::Refunded);
        }
        assert_eq!(
            engine.ledger().account(&brand.id).unwrap().balance_minor,
            2_000
        );
        assert_eq!(
            engine.campaigns().campaign(&campaign.id).unwrap().status,
            CampaignStatus::Cancelled
        );
        engine.verify_consistency().unwrap();
        assert!(engine.verify_journal().await);
    }

    struct StubRail {
        rail: PaymentMethodKind,
        executed: Mutex<Vec<PayoutInstruction>>,
        fail: bool,
    }

    impl StubRail {
        fn new(rail: PaymentMethodKind, fail: bool) -> Self {
            Self {
                rail,
                executed: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl PayoutConnector for StubRail {
        fn rail(&self) -> PaymentMethodKind {
            self.rail
        }

        async fn execute(
            &self,
            instruction: &PayoutInstruction,
        ) -> Result<PayoutReceipt, EngineError> {
            self.executed.lock().unwrap().push(instruction.clone());
            if self.fail {
                return Err(EngineError::constraint("rail unavailable"));
            }
            Ok(PayoutReceipt {
                reference: format!("stub-{}", instruction.transaction_id),
                rail: self.rail,
                settled_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn withdrawal_settles_through_connector() {
        let engine = engine_with_fee(0).await;
        let rail = Arc::new(StubRail::new(PaymentMethodKind::Mpesa, false));
        engine.register_payout_connector(rail.clone()).unwrap();

        let account = engine.ledger().create_account("wanjiku", None).await.unwrap();
        engine
            .ledger()
            .deposit(&account.id, 900, PaymentMethodKind::Mpesa)
            .await
            .unwrap();
        let method = engine
            .ledger()
            .register_payment_method(&account.id, PaymentMethodKind::Mpesa, "+254700000001")
            .await
            .unwrap();
        let tx = engine
            .ledger()
            .request_withdrawal(&account.id, 400, &method.id)
            .await
            .unwrap();

        let tx = engine.process_withdrawal(&tx.id).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);

        let account = engine.ledger().account(&account.id).unwrap();
        assert_eq!(account.balance_minor, 500);
        assert_eq!(account.hold_minor, 0);

        let sent = rail.executed.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount_minor, 400);
        assert_eq!(sent[0].destination, "+254700000001");
        drop(sent);
        engine.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn failed_payout_releases_reserved_funds() {
        let engine = engine_with_fee(0).await;
        engine
            .register_payout_connector(Arc::new(StubRail::new(PaymentMethodKind::Mpesa, true)))
            .unwrap();

        let account = engine.ledger().create_account("wanjiku", None).await.unwrap();
        engine
            .ledger()
            .deposit(&account.id, 900, PaymentMethodKind::Mpesa)
            .await
            .unwrap();
        let method = engine
            .ledger()
            .register_payment_method(&account.id, PaymentMethodKind::Mpesa, "+254700000001")
            .await
            .unwrap();
        let tx = engine
            .ledger()
            .request_withdrawal(&account.id, 400, &method.id)
            .await
            .unwrap();
        assert_eq!(engine.ledger().account(&account.id).unwrap().hold_minor, 400);

        let err = engine.process_withdrawal(&tx.id).await.unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));

        let tx = engine.ledger().transaction(&tx.id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        let account = engine.ledger().account(&account.id).unwrap();
        assert_eq!(account.balance_minor, 900);
        assert_eq!(account.hold_minor, 0);
        engine.verify_consistency().unwrap();
    }

    struct Recorder(Mutex<Vec<NotificationEvent>>);

    #[async_trait]
    impl NotificationSink for Recorder {
        async fn notify(&self, event: NotificationEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn sinks_observe_terminal_transitions() {
        let engine = engine_with_fee(0).await;
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        engine.register_sink(recorder.clone()).unwrap();

        let creator = approved_creator(&engine, "wanjiku").await;
        funded_brand(&engine, "acme", 1_000).await;
        let (_, bid, hold) = accepted_bid(&engine, "acme", &creator, 1_000).await;
        complete_work(&engine, &bid).await;
        engine.escrow().release(&hold.id).await.unwrap();

        let events = recorder.0.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| e.kind == NotificationKind::BidPaid && e.entity_id == bid.id));
    }

    struct ReentrantSink {
        engine: MarketEngine,
    }

    #[async_trait]
    impl NotificationSink for ReentrantSink {
        async fn notify(&self, _event: NotificationEvent) {
            let _ = self.engine.creators().register("late-signup").await;
        }
    }

    #[tokio::test]
    async fn sink_writes_do_not_block_the_emitting_operation() {
        let engine = engine_with_fee(0).await;
        engine
            .register_sink(Arc::new(ReentrantSink {
                engine: engine.clone(),
            }))
            .unwrap();

        let creator = approved_creator(&engine, "wanjiku").await;
        funded_brand(&engine, "acme", 1_000).await;
        let (_, bid, hold) = accepted_bid(&engine, "acme", &creator, 1_000).await;
        complete_work(&engine, &bid).await;

        let released = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.escrow().release(&hold.id),
        )
        .await
        .expect("release returned")
        .unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
    }

    #[tokio::test]
    async fn cancel_rejects_outstanding_pending_bids() {
        let engine = engine_with_fee(0).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        funded_brand(&engine, "acme", 1_000).await;
        let campaign = engine
            .campaigns()
            .create_brief("acme", "launch video", 1_000, vec![Platform::Tiktok])
            .await
            .unwrap();
        let bid = engine
            .bids()
            .place(&campaign.id, &creator.id, 1_000, None)
            .await
            .unwrap();

        let cancelled = engine.campaigns().cancel(&campaign.id).await.unwrap();
        assert_eq!(cancelled.status, CampaignStatus::Cancelled);
        assert_eq!(
            engine.bids().bid(&bid.id).unwrap().status,
            BidStatus::Rejected
        );
        engine.verify_consistency().unwrap();
    }

    #[tokio::test]
    async fn split_resolution_divides_one_hold() {
        let engine = engine_with_fee(0).await;
        let creator = approved_creator(&engine, "wanjiku").await;
        let brand = funded_brand(&engine, "acme", 1_000).await;
        let (campaign, _, _) = accepted_bid(&engine, "acme", &creator, 1_000).await;

        let dispute = engine
            .disputes()
            .open(&campaign.id, "acme", "post went live late")
            .await
            .unwrap();
        engine.disputes().begin_review(&dispute.id).await.unwrap();
        engine
            .disputes()
            .resolve(
                &dispute.id,
                DisputeOutcome::Split { creator_minor: 600 },
                "partial delivery",
            )
            .await
            .unwrap();

        let payee = engine.ledger().account_for_owner(&creator.id).unwrap();
        assert_eq!(payee.balance_minor, 600);
        assert_eq!(
            engine.ledger().account(&brand.id).unwrap().balance_minor,
            400
        );
        assert_eq!(
            engine.campaigns().campaign(&campaign.id).unwrap().status,
            CampaignStatus::Completed
        );
        engine.verify_consistency().unwrap();
        assert!(engine.verify_journal().await);
    }
}
