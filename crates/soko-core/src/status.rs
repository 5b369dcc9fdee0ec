use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Closed status vocabularies persisted as lowercase tokens.
///
/// Every enum here is the authoritative contract for its column: parsing is
/// strict, so a miscased or unknown token fails instead of being coerced.
/// Transition legality lives next to each vocabulary so managers share one
/// source of truth.
macro_rules! status_vocab {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const TOKENS: &'static [&'static str] = &[$($token),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = EngineError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($token => Ok($name::$variant),)+
                    other => Err(EngineError::ConstraintViolation(format!(
                        "unknown {} token '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_vocab! {
    /// Creator identity review outcome. Gates bid placement and acceptance.
    VerificationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl VerificationStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Rejected, Self::Pending)
        )
    }
}

status_vocab! {
    /// Social platform a package, campaign, or deliverable targets.
    Platform {
        Instagram => "instagram",
        Tiktok => "tiktok",
        Youtube => "youtube",
        Twitter => "twitter",
        Multi => "multi",
    }
}

status_vocab! {
    PackageStatus {
        Active => "active",
        Paused => "paused",
        Deleted => "deleted",
    }
}

impl PackageStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Paused)
                | (Self::Active, Self::Deleted)
                | (Self::Paused, Self::Active)
                | (Self::Paused, Self::Deleted)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Deleted
    }
}

status_vocab! {
    /// Payout rail for deposits and withdrawals.
    PaymentMethodKind {
        Mpesa => "mpesa",
        AirtelMoney => "airtel_money",
        BankTransfer => "bank_transfer",
    }
}

status_vocab! {
    TransactionType {
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        EscrowLock => "escrow_lock",
        EscrowRelease => "escrow_release",
        EscrowRefund => "escrow_refund",
        PlatformFee => "platform_fee",
        Transfer => "transfer",
    }
}

status_vocab! {
    TransactionStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TransactionStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

status_vocab! {
    EscrowStatus {
        Locked => "locked",
        Released => "released",
        Refunded => "refunded",
        Disputed => "disputed",
    }
}

impl EscrowStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Locked, Self::Released)
                | (Self::Locked, Self::Refunded)
                | (Self::Locked, Self::Disputed)
                | (Self::Disputed, Self::Released)
                | (Self::Disputed, Self::Refunded)
                | (Self::Disputed, Self::Locked)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

status_vocab! {
    CampaignStatus {
        Open => "open",
        Closed => "closed",
        Pending => "pending",
        Accepted => "accepted",
        InProgress => "in_progress",
        DraftSubmitted => "draft_submitted",
        RevisionRequested => "revision_requested",
        DraftApproved => "draft_approved",
        Published => "published",
        PendingReview => "pending_review",
        Completed => "completed",
        Disputed => "disputed",
        Cancelled => "cancelled",
    }
}

impl CampaignStatus {
    /// Forward progression for the happy path, plus the side exits.
    ///
    /// Any non-terminal status may be cancelled or disputed. A disputed
    /// campaign may resolve forward (completed/cancelled) or revert to the
    /// status it held when the dispute was filed. `closed` is reachable only
    /// from `open` (no-winner closure), `completed`, or `cancelled`.
    pub fn can_advance(self, next: Self) -> bool {
        if self == next {
            return false;
        }
        match self {
            Self::Open => matches!(
                next,
                Self::Pending | Self::Closed | Self::Cancelled | Self::Disputed
            ),
            Self::Pending => matches!(next, Self::Accepted | Self::Cancelled | Self::Disputed),
            Self::Accepted => matches!(next, Self::InProgress | Self::Cancelled | Self::Disputed),
            Self::InProgress => {
                matches!(next, Self::DraftSubmitted | Self::Cancelled | Self::Disputed)
            }
            Self::DraftSubmitted => matches!(
                next,
                Self::RevisionRequested | Self::DraftApproved | Self::Cancelled | Self::Disputed
            ),
            Self::RevisionRequested => {
                matches!(next, Self::DraftSubmitted | Self::Cancelled | Self::Disputed)
            }
            Self::DraftApproved => matches!(next, Self::Published | Self::Cancelled | Self::Disputed),
            Self::Published => matches!(next, Self::PendingReview | Self::Cancelled | Self::Disputed),
            Self::PendingReview => matches!(next, Self::Completed | Self::Cancelled | Self::Disputed),
            Self::Completed => next == Self::Closed,
            Self::Cancelled => next == Self::Closed,
            Self::Disputed => next != Self::Closed,
            Self::Closed => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

status_vocab! {
    DeliverableStatus {
        Pending => "pending",
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
        Published => "published",
        Verified => "verified",
    }
}

impl DeliverableStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Draft)
                | (Self::Draft, Self::Submitted)
                | (Self::Submitted, Self::Approved)
                | (Self::Submitted, Self::Rejected)
                | (Self::Rejected, Self::Draft)
                | (Self::Approved, Self::Published)
                | (Self::Published, Self::Verified)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Verified
    }
}

status_vocab! {
    DisputeStatus {
        Open => "open",
        UnderReview => "under_review",
        Resolved => "resolved",
        Closed => "closed",
    }
}

impl DisputeStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::UnderReview)
                | (Self::Open, Self::Closed)
                | (Self::UnderReview, Self::Resolved)
                | (Self::UnderReview, Self::Closed)
                | (Self::Resolved, Self::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

status_vocab! {
    BidStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
        Completed => "completed",
        Paid => "paid",
    }
}

impl BidStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Withdrawn)
                | (Self::Accepted, Self::Completed)
                | (Self::Completed, Self::Paid)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Withdrawn | Self::Completed | Self::Paid
        )
    }
}

status_vocab! {
    ProofStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        RevisionRequested => "revision_requested",
    }
}

impl ProofStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::RevisionRequested)
                | (Self::Rejected, Self::Pending)
                | (Self::RevisionRequested, Self::Pending)
        )
    }
}

status_vocab! {
    ContentStatus {
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        Published => "published",
    }
}

impl ContentStatus {
    pub fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Submitted)
                | (Self::Submitted, Self::Approved)
                | (Self::Submitted, Self::Draft)
                | (Self::Approved, Self::Published)
        )
    }
}
