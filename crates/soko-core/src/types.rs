use crate::status::{
    BidStatus, CampaignStatus, ContentStatus, DeliverableStatus, DisputeStatus, EscrowStatus,
    PackageStatus, PaymentMethodKind, Platform, ProofStatus, TransactionStatus, TransactionType,
    VerificationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monetary amounts are fixed-point minor units of the account currency.
pub type AmountMinor = i64;

/// Wallet scoped to one owner identity. The balance is mutated only by
/// committed wallet transactions; `hold_minor` tracks funds reserved by
/// pending withdrawal requests and is advisory for availability checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccount {
    pub id: String,
    pub owner_id: String,
    pub currency: String,
    pub balance_minor: AmountMinor,
    pub hold_minor: AmountMinor,
    pub total_earned_minor: AmountMinor,
    pub total_spent_minor: AmountMinor,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletAccount {
    pub fn new(owner_id: impl Into<String>, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            currency: currency.into(),
            balance_minor: 0,
            hold_minor: 0,
            total_earned_minor: 0,
            total_spent_minor: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance not reserved by a pending withdrawal.
    pub fn available_minor(&self) -> AmountMinor {
        self.balance_minor - self.hold_minor
    }
}

/// Registered payout destination on a wallet account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub account_id: String,
    pub kind: PaymentMethodKind,
    pub destination: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn new(
        account_id: impl Into<String>,
        kind: PaymentMethodKind,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            kind,
            destination: destination.into(),
            version: 1,
            created_at: Utc::now(),
        }
    }
}

/// Single signed movement against a wallet account. Immutable once the
/// status reaches a terminal token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub account_id: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub amount_minor: AmountMinor,
    pub hold_id: Option<String>,
    pub rail: Option<PaymentMethodKind>,
    /// Funds reserved on the account while this transaction is in flight.
    /// Released when the transaction reaches a terminal status.
    pub reserved_minor: AmountMinor,
    pub description: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WalletTransaction {
    pub fn open(
        account_id: impl Into<String>,
        tx_type: TransactionType,
        amount_minor: AmountMinor,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            tx_type,
            status: TransactionStatus::Pending,
            amount_minor,
            hold_id: None,
            rail: None,
            reserved_minor: 0,
            description: description.into(),
            version: 1,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_rail(mut self, rail: PaymentMethodKind) -> Self {
        self.rail = Some(rail);
        self
    }
}

/// Funds reserved against a future payout for one campaign/bid pair.
///
/// Created only through an `escrow_lock` transaction and settled exactly once
/// by a release or refund transaction recorded in `settle_transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowHold {
    pub id: String,
    pub campaign_id: String,
    pub bid_id: String,
    pub payer_account_id: String,
    pub payee_account_id: String,
    pub amount_minor: AmountMinor,
    pub status: EscrowStatus,
    pub lock_transaction_id: String,
    pub settle_transaction_id: Option<String>,
    pub parent_hold_id: Option<String>,
    pub locked_at: DateTime<Utc>,
    pub auto_release_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Creator identity awaiting or holding verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorProfile {
    pub id: String,
    pub display_name: String,
    pub verification_status: VerificationStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CreatorProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            verification_status: VerificationStatus::Pending,
            version: 1,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }
}

/// Creator-offered service listing purchasable through a direct campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub creator_id: String,
    pub name: String,
    pub platform: Platform,
    pub price_minor: AmountMinor,
    pub status: PackageStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub brand_id: String,
    pub title: String,
    pub budget_minor: AmountMinor,
    pub platforms: Vec<Platform>,
    pub creator_id: Option<String>,
    pub package_id: Option<String>,
    pub status: CampaignStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub campaign_id: String,
    pub creator_id: String,
    pub amount_minor: AmountMinor,
    pub message: Option<String>,
    pub package_id: Option<String>,
    pub status: BidStatus,
    pub escrow_hold_id: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One unit of creator work moving from draft to verified publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: String,
    pub campaign_id: String,
    pub bid_id: String,
    pub creator_id: String,
    pub platform: Platform,
    pub content_type: String,
    pub draft_url: Option<String>,
    pub published_url: Option<String>,
    pub status: DeliverableStatus,
    pub reviewer_notes: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Evidence that a published deliverable ran as agreed. Approval is the
/// trigger for bid completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfWork {
    pub id: String,
    pub bid_id: String,
    pub campaign_id: String,
    pub creator_id: String,
    pub title: String,
    pub content_links: Vec<String>,
    pub status: ProofStatus,
    pub reviewer_notes: Option<String>,
    pub version: u64,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Campaign-level content item with its own approval track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContent {
    pub id: String,
    pub campaign_id: String,
    pub topic: String,
    pub platform: Option<Platform>,
    pub status: ContentStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: String,
    pub campaign_id: String,
    pub raised_by: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    /// Campaign status at filing time, restored if the dispute is withdrawn.
    pub campaign_status_before: CampaignStatus,
    pub version: u64,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_starts_empty() {
        let account = WalletAccount::new("brand-1", "KES");
        assert_eq!(account.balance_minor, 0);
        assert_eq!(account.available_minor(), 0);
        assert_eq!(account.version, 1);
    }

    #[test]
    fn available_excludes_withdrawal_holds() {
        let mut account = WalletAccount::new("brand-1", "KES");
        account.balance_minor = 1_000;
        account.hold_minor = 400;
        assert_eq!(account.available_minor(), 600);
    }

    #[test]
    fn open_transaction_is_pending() {
        let tx = WalletTransaction::open("acct-1", TransactionType::Deposit, 500, "top up")
            .with_rail(PaymentMethodKind::Mpesa);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.rail, Some(PaymentMethodKind::Mpesa));
        assert!(tx.completed_at.is_none());
    }
}
