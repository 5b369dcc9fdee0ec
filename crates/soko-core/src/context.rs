use crate::engine::EngineConfig;
use crate::error::EngineError;
use crate::journal::JournalEntryKind;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::payout::PayoutRegistry;
use crate::status::TransactionType;
use crate::storage::PersistentJournal;
use crate::store::MarketStore;
use crate::types::WalletTransaction;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Journal entry prepared during an operation and appended as one batch
/// before the store apply step.
#[derive(Debug, Clone)]
pub(crate) struct JournalDraft {
    pub kind: JournalEntryKind,
    pub entity_ref: Option<String>,
    pub payload: Value,
}

impl JournalDraft {
    pub fn transition(
        entity: &'static str,
        entity_id: &str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self {
            kind: JournalEntryKind::Transition,
            entity_ref: Some(format!("{entity}:{entity_id}")),
            payload: serde_json::json!({
                "entity": entity,
                "entity_id": entity_id,
                "from": from.to_string(),
                "to": to.to_string(),
            }),
        }
    }

    pub fn money(tx: &WalletTransaction, balance_after_minor: i64) -> Self {
        Self {
            kind: JournalEntryKind::Money,
            entity_ref: Some(format!("wallet_account:{}", tx.account_id)),
            payload: serde_json::json!({
                "account_id": tx.account_id,
                "transaction_id": tx.id,
                "tx_type": tx.tx_type.as_str(),
                "amount_minor": tx.amount_minor,
                "balance_after_minor": balance_after_minor,
            }),
        }
    }

    pub fn note(entity_ref: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: JournalEntryKind::Note,
            entity_ref,
            payload: serde_json::json!({ "detail": detail.into() }),
        }
    }
}

pub(crate) fn operation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Shared state behind every manager.
///
/// `write_lane` serializes all state-changing operations: an operation takes
/// its optimistic snapshot before entering the lane, re-checks entity
/// versions inside it, appends journal entries, then applies store writes.
/// Readers bypass the lane entirely.
pub(crate) struct EngineContext {
    pub store: MarketStore,
    pub journal: AsyncMutex<PersistentJournal>,
    pub write_lane: AsyncMutex<()>,
    pub config: EngineConfig,
    pub platform_account_id: RwLock<Option<String>>,
    pub sinks: RwLock<Vec<Arc<dyn NotificationSink>>>,
    pub payouts: RwLock<PayoutRegistry>,
}

impl EngineContext {
    pub fn new(config: EngineConfig, journal: PersistentJournal) -> Self {
        Self {
            store: MarketStore::new(),
            journal: AsyncMutex::new(journal),
            write_lane: AsyncMutex::new(()),
            config,
            platform_account_id: RwLock::new(None),
            sinks: RwLock::new(Vec::new()),
            payouts: RwLock::new(PayoutRegistry::new()),
        }
    }

    /// Append an operation's journal drafts in order, persisting each before
    /// it joins the in-memory chain.
    pub async fn journal_all(
        &self,
        operation_id: &str,
        drafts: Vec<JournalDraft>,
    ) -> Result<(), EngineError> {
        let mut journal = self.journal.lock().await;
        for draft in drafts {
            journal
                .append(operation_id, draft.kind, draft.entity_ref, draft.payload)
                .await?;
        }
        Ok(())
    }

    pub fn platform_account_id(&self) -> Result<String, EngineError> {
        self.platform_account_id
            .read()
            .map_err(|_| EngineError::LockPoisoned)?
            .clone()
            .ok_or_else(|| EngineError::constraint("platform revenue account not initialized"))
    }

    /// Fire-and-forget delivery to every registered sink. Failures never
    /// surface to the caller; the transition has already committed.
    pub async fn emit(&self, event: NotificationEvent) {
        let sinks: Vec<Arc<dyn NotificationSink>> = match self.sinks.read() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for sink in sinks {
            sink.notify(event.clone()).await;
        }
    }
}

/// Positive-amount transaction types.
pub(crate) fn is_credit_type(tx_type: TransactionType) -> bool {
    matches!(
        tx_type,
        TransactionType::Deposit
            | TransactionType::EscrowRelease
            | TransactionType::EscrowRefund
            | TransactionType::PlatformFee
    )
}

/// Negative-amount transaction types.
pub(crate) fn is_debit_type(tx_type: TransactionType) -> bool {
    matches!(
        tx_type,
        TransactionType::Withdrawal | TransactionType::EscrowLock
    )
}
