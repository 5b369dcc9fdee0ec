//! Payout rail connectors and notification sinks for the soko engine.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::Utc;
use soko_core::error::EngineError;
use soko_core::notify::{NotificationEvent, NotificationSink};
use soko_core::payout::{PayoutConnector, PayoutInstruction, PayoutReceipt};
use soko_core::status::PaymentMethodKind;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

fn mock_receipt(prefix: &str, rail: PaymentMethodKind) -> PayoutReceipt {
    let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    PayoutReceipt {
        reference: format!("{prefix}-{short_id}"),
        rail,
        settled_at: Utc::now(),
    }
}

/// Mock M-Pesa connector for deterministic local payout simulation.
#[derive(Debug, Clone, Default)]
pub struct MockMpesaConnector;

#[async_trait]
impl PayoutConnector for MockMpesaConnector {
    fn rail(&self) -> PaymentMethodKind {
        PaymentMethodKind::Mpesa
    }

    async fn execute(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutReceipt, EngineError> {
        if !instruction.destination.starts_with("+254") {
            return Err(EngineError::ConstraintViolation(format!(
                "destination {} is not a Kenyan MSISDN",
                instruction.destination
            )));
        }
        info!(
            transaction_id = %instruction.transaction_id,
            amount_minor = instruction.amount_minor,
            "mpesa payout simulated"
        );
        Ok(mock_receipt("mpesa", self.rail()))
    }
}

/// Mock Airtel Money connector.
#[derive(Debug, Clone, Default)]
pub struct MockAirtelConnector;

#[async_trait]
impl PayoutConnector for MockAirtelConnector {
    fn rail(&self) -> PaymentMethodKind {
        PaymentMethodKind::AirtelMoney
    }

    async fn execute(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutReceipt, EngineError> {
        info!(
            transaction_id = %instruction.transaction_id,
            amount_minor = instruction.amount_minor,
            "airtel payout simulated"
        );
        Ok(mock_receipt("airtel", self.rail()))
    }
}

/// Mock bank transfer connector.
#[derive(Debug, Clone, Default)]
pub struct MockBankTransferConnector;

#[async_trait]
impl PayoutConnector for MockBankTransferConnector {
    fn rail(&self) -> PaymentMethodKind {
        PaymentMethodKind::BankTransfer
    }

    async fn execute(
        &self,
        instruction: &PayoutInstruction,
    ) -> Result<PayoutReceipt, EngineError> {
        info!(
            transaction_id = %instruction.transaction_id,
            amount_minor = instruction.amount_minor,
            destination = %instruction.destination,
            "bank transfer simulated"
        );
        Ok(mock_receipt("bank", self.rail()))
    }
}

/// Deterministic failing connector useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailConnector {
    rail: PaymentMethodKind,
    reason: String,
}

impl AlwaysFailConnector {
    pub fn new(rail: PaymentMethodKind, reason: impl Into<String>) -> Self {
        Self {
            rail,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PayoutConnector for AlwaysFailConnector {
    fn rail(&self) -> PaymentMethodKind {
        self.rail
    }

    async fn execute(
        &self,
        _instruction: &PayoutInstruction,
    ) -> Result<PayoutReceipt, EngineError> {
        Err(EngineError::ConstraintViolation(self.reason.clone()))
    }
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: NotificationEvent) {
        info!(
            kind = ?event.kind,
            entity_id = %event.entity_id,
            campaign_id = ?event.campaign_id,
            "{}",
            event.detail
        );
    }
}

/// Sink that records events in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soko_core::notify::NotificationKind;

    fn instruction(destination: &str) -> PayoutInstruction {
        PayoutInstruction {
            transaction_id: "tx-1".to_string(),
            account_id: "acct-1".to_string(),
            rail: PaymentMethodKind::Mpesa,
            destination: destination.to_string(),
            amount_minor: 500,
            currency: "KES".to_string(),
        }
    }

    #[tokio::test]
    async fn mpesa_rejects_foreign_destination() {
        let connector = MockMpesaConnector;
        let err = connector.execute(&instruction("+4470000")).await.unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));

        let receipt = connector.execute(&instruction("+254700000001")).await.unwrap();
        assert!(receipt.reference.starts_with("mpesa-"));
        assert_eq!(receipt.rail, PaymentMethodKind::Mpesa);
    }

    #[tokio::test]
    async fn failing_connector_reports_its_reason() {
        let connector = AlwaysFailConnector::new(PaymentMethodKind::BankTransfer, "rail offline");
        let err = connector.execute(&instruction("acct")).await.unwrap_err();
        assert!(err.to_string().contains("rail offline"));
    }

    #[tokio::test]
    async fn recording_sink_keeps_events() {
        let sink = RecordingSink::new();
        sink.notify(NotificationEvent::new(
            NotificationKind::BidPaid,
            "bid-1",
            None,
            "escrow released",
        ))
        .await;
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::BidPaid);
    }
}
