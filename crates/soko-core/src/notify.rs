use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal transitions worth telling the outside world about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BidPaid,
    DisputeResolved,
    CampaignCancelled,
    CampaignCompleted,
    EscrowRefunded,
    WithdrawalCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub entity_id: String,
    pub campaign_id: Option<String>,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        kind: NotificationKind,
        entity_id: impl Into<String>,
        campaign_id: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            campaign_id,
            detail: detail.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Outbound notification seam.
///
/// Delivery is fire-and-forget: the engine invokes sinks after a transition
/// has committed and ignores delivery failures, so a sink can never roll back
/// or stall a state change.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tokens_are_snake_case() {
        let json = serde_json::to_string(&NotificationKind::BidPaid).unwrap();
        assert_eq!(json, "\"bid_paid\"");
        let json = serde_json::to_string(&NotificationKind::DisputeResolved).unwrap();
        assert_eq!(json, "\"dispute_resolved\"");
    }
}
