//! Escrow and campaign lifecycle engine for a creator marketplace.
//!
//! This crate enforces the money invariants with explicit status vocabularies,
//! escrow holds debited at lock time, guard checks before every write, and an
//! append-only hash-chained journal.

#![deny(unsafe_code)]

pub mod bids;
pub mod campaigns;
mod context;
pub mod deliverables;
pub mod disputes;
pub mod engine;
pub mod error;
pub mod escrow;
mod guard;
pub mod journal;
pub mod ledger;
pub mod migrate;
pub mod notify;
pub mod payout;
pub mod profiles;
pub mod status;
pub mod storage;
mod store;
pub mod types;

pub use bids::BidManager;
pub use campaigns::CampaignOrchestrator;
pub use deliverables::{DeliverableTracker, ProofDecision, ReviewDecision};
pub use disputes::{DisputeOutcome, DisputeResolver};
pub use engine::{EngineConfig, MarketEngine};
pub use error::EngineError;
pub use escrow::EscrowManager;
pub use journal::{AppendOnlyJournal, JournalEntry, JournalEntryKind};
pub use ledger::LedgerStore;
pub use migrate::{
    normalize_snapshot, normalize_value, NormalizationReport, NormalizedCell, RawStatusCell,
};
pub use notify::{NotificationEvent, NotificationKind, NotificationSink};
pub use payout::{PayoutConnector, PayoutInstruction, PayoutReceipt, PayoutRegistry};
pub use profiles::CreatorRegistry;
pub use status::{
    BidStatus, CampaignStatus, ContentStatus, DeliverableStatus, DisputeStatus, EscrowStatus,
    PackageStatus, PaymentMethodKind, Platform, ProofStatus, TransactionStatus, TransactionType,
    VerificationStatus,
};
pub use storage::{JournalStorageConfig, PersistentJournal};
pub use types::{
    AmountMinor, Bid, Campaign, CampaignContent, CreatorProfile, Deliverable, Dispute, EscrowHold,
    Package, PaymentMethod, ProofOfWork, WalletAccount, WalletTransaction,
};
