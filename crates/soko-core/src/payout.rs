use crate::error::EngineError;
use crate::status::PaymentMethodKind;
use crate::types::AmountMinor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Instruction handed to an external payout rail when a withdrawal is
/// processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub transaction_id: String,
    pub account_id: String,
    pub rail: PaymentMethodKind,
    pub destination: String,
    pub amount_minor: AmountMinor,
    pub currency: String,
}

/// Receipt returned by a rail after it has taken the payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
    pub rail: PaymentMethodKind,
    pub settled_at: DateTime<Utc>,
}

/// Pluggable payout rail connector.
///
/// Implementations move funds on an external rail (mobile money, bank). The
/// engine treats a returned error as a failed withdrawal and releases the
/// reserved funds back to the account.
#[async_trait]
pub trait PayoutConnector: Send + Sync {
    fn rail(&self) -> PaymentMethodKind;

    async fn execute(&self, instruction: &PayoutInstruction) -> Result<PayoutReceipt, EngineError>;
}

/// Registry for payout connectors keyed by rail.
#[derive(Default)]
pub struct PayoutRegistry {
    connectors: HashMap<PaymentMethodKind, Arc<dyn PayoutConnector>>,
}

impl PayoutRegistry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    pub fn register(&mut self, connector: Arc<dyn PayoutConnector>) {
        self.connectors.insert(connector.rail(), connector);
    }

    pub fn get(&self, rail: PaymentMethodKind) -> Option<Arc<dyn PayoutConnector>> {
        self.connectors.get(&rail).cloned()
    }

    pub fn has(&self, rail: PaymentMethodKind) -> bool {
        self.connectors.contains_key(&rail)
    }
}
