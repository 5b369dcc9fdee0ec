use crate::error::EngineError;
use crate::types::{
    Bid, Campaign, CampaignContent, CreatorProfile, Deliverable, Dispute, EscrowHold, Package,
    PaymentMethod, ProofOfWork, WalletAccount, WalletTransaction,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Entity persisted in the store with optimistic version tracking.
pub(crate) trait Record: Clone {
    const ENTITY: &'static str;

    fn record_id(&self) -> &str;
    fn record_version(&self) -> u64;
    fn set_record_version(&mut self, version: u64);
}

macro_rules! impl_record {
    ($type:ty, $entity:literal) => {
        impl Record for $type {
            const ENTITY: &'static str = $entity;

            fn record_id(&self) -> &str {
                &self.id
            }

            fn record_version(&self) -> u64 {
                self.version
            }

            fn set_record_version(&mut self, version: u64) {
                self.version = version;
            }
        }
    };
}

impl_record!(WalletAccount, "wallet_account");
impl_record!(PaymentMethod, "payment_method");
impl_record!(WalletTransaction, "wallet_transaction");
impl_record!(EscrowHold, "escrow_hold");
impl_record!(CreatorProfile, "creator_profile");
impl_record!(Package, "package");
impl_record!(Campaign, "campaign");
impl_record!(Bid, "bid");
impl_record!(Deliverable, "deliverable");
impl_record!(ProofOfWork, "proof_of_work");
impl_record!(CampaignContent, "campaign_content");
impl_record!(Dispute, "dispute");

/// Keyed table for one entity type.
#[derive(Debug)]
pub(crate) struct Table<T: Record> {
    rows: HashMap<String, T>,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T: Record> Table<T> {
    pub fn find(&self, id: &str) -> Option<&T> {
        self.rows.get(id)
    }

    pub fn get(&self, id: &str) -> Result<&T, EngineError> {
        self.rows
            .get(id)
            .ok_or_else(|| EngineError::not_found(T::ENTITY, id))
    }

    pub fn insert(&mut self, record: T) -> Result<(), EngineError> {
        if self.rows.contains_key(record.record_id()) {
            return Err(EngineError::constraint(format!(
                "{} {} already exists",
                T::ENTITY,
                record.record_id()
            )));
        }
        self.rows.insert(record.record_id().to_string(), record);
        Ok(())
    }

    /// Optimistic precondition: fails when the caller's snapshot went stale.
    pub fn expect_version(&self, id: &str, expected: u64) -> Result<(), EngineError> {
        let current = self.get(id)?.record_version();
        if current != expected {
            return Err(EngineError::ConcurrentModification {
                entity: T::ENTITY,
                id: id.to_string(),
                expected,
                found: current,
            });
        }
        Ok(())
    }

    /// Store an updated copy of an existing row, bumping its version.
    pub fn put(&mut self, mut record: T) -> Result<(), EngineError> {
        let current = self.get(record.record_id())?.record_version();
        record.set_record_version(current + 1);
        self.rows.insert(record.record_id().to_string(), record);
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

/// All marketplace state behind one read/write lock.
///
/// Writers serialize through the engine's write lane, so a write guard only
/// ever covers the final apply step of a transition. Readers take snapshots
/// without blocking writers for longer than a clone.
#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub accounts: Table<WalletAccount>,
    pub account_ids_by_owner: HashMap<String, String>,
    pub payment_methods: Table<PaymentMethod>,
    pub transactions: Table<WalletTransaction>,
    pub holds: Table<EscrowHold>,
    pub profiles: Table<CreatorProfile>,
    pub packages: Table<Package>,
    pub campaigns: Table<Campaign>,
    pub bids: Table<Bid>,
    pub deliverables: Table<Deliverable>,
    pub proofs: Table<ProofOfWork>,
    pub contents: Table<CampaignContent>,
    pub disputes: Table<Dispute>,
}

impl StoreInner {
    pub fn insert_account(&mut self, account: WalletAccount) -> Result<(), EngineError> {
        if self.account_ids_by_owner.contains_key(&account.owner_id) {
            return Err(EngineError::constraint(format!(
                "owner {} already has a wallet account",
                account.owner_id
            )));
        }
        self.account_ids_by_owner
            .insert(account.owner_id.clone(), account.id.clone());
        self.accounts.insert(account)
    }

    pub fn account_for_owner(&self, owner_id: &str) -> Option<&WalletAccount> {
        self.account_ids_by_owner
            .get(owner_id)
            .and_then(|id| self.accounts.find(id))
    }

    pub fn bids_for_campaign(&self, campaign_id: &str) -> Vec<&Bid> {
        self.bids
            .values()
            .filter(|bid| bid.campaign_id == campaign_id)
            .collect()
    }

    pub fn holds_for_campaign(&self, campaign_id: &str) -> Vec<&EscrowHold> {
        self.holds
            .values()
            .filter(|hold| hold.campaign_id == campaign_id)
            .collect()
    }

    pub fn transactions_for_account(&self, account_id: &str) -> Vec<&WalletTransaction> {
        self.transactions
            .values()
            .filter(|tx| tx.account_id == account_id)
            .collect()
    }

    pub fn disputes_for_campaign(&self, campaign_id: &str) -> Vec<&Dispute> {
        self.disputes
            .values()
            .filter(|dispute| dispute.campaign_id == campaign_id)
            .collect()
    }

    pub fn deliverables_for_bid(&self, bid_id: &str) -> Vec<&Deliverable> {
        self.deliverables
            .values()
            .filter(|deliverable| deliverable.bid_id == bid_id)
            .collect()
    }
}

/// Shared handle over the store lock.
#[derive(Debug, Default)]
pub(crate) struct MarketStore {
    inner: RwLock<StoreInner>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, EngineError> {
        self.inner.read().map_err(|_| EngineError::LockPoisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, EngineError> {
        self.inner.write().map_err(|_| EngineError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_bumps_version_and_detects_stale_snapshots() {
        let mut inner = StoreInner::default();
        let account = WalletAccount::new("brand-1", "KES");
        let id = account.id.clone();
        inner.insert_account(account).unwrap();

        let mut copy = inner.accounts.get(&id).unwrap().clone();
        copy.balance_minor = 500;
        inner.accounts.put(copy).unwrap();

        assert_eq!(inner.accounts.get(&id).unwrap().version, 2);
        let err = inner.accounts.expect_version(&id, 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConcurrentModification {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_owner_account_is_rejected() {
        let mut inner = StoreInner::default();
        inner
            .insert_account(WalletAccount::new("brand-1", "KES"))
            .unwrap();
        let err = inner
            .insert_account(WalletAccount::new("brand-1", "KES"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }

    #[test]
    fn owner_index_resolves_accounts() {
        let mut inner = StoreInner::default();
        let account = WalletAccount::new("creator-1", "KES");
        let id = account.id.clone();
        inner.insert_account(account).unwrap();
        assert_eq!(inner.account_for_owner("creator-1").unwrap().id, id);
        assert!(inner.account_for_owner("creator-2").is_none());
    }
}
