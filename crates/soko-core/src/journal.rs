use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Journal entry types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntryKind {
    /// A lifecycle status change on one entity.
    Transition,
    /// A completed balance movement on a wallet account.
    Money,
    /// Operational annotation (guard checks, dispute context).
    Note,
}

impl JournalEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::Money => "money",
            Self::Note => "note",
        }
    }
}

impl std::str::FromStr for JournalEntryKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "transition" => Ok(Self::Transition),
            "money" => Ok(Self::Money),
            "note" => Ok(Self::Note),
            other => Err(EngineError::Journal(format!(
                "unknown journal entry kind '{other}'"
            ))),
        }
    }
}

/// Hash-chained journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: String,
    pub index: u64,
    pub operation_id: String,
    pub kind: JournalEntryKind,
    pub entity_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Payload for a lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub entity: String,
    pub entity_id: String,
    pub from: String,
    pub to: String,
}

impl TransitionEvent {
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            entity_id: entity_id.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Payload for a completed balance movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyEvent {
    pub account_id: String,
    pub transaction_id: String,
    pub tx_type: String,
    pub amount_minor: i64,
    pub balance_after_minor: i64,
}

/// Append-only audit trail.
///
/// Every lifecycle transition and balance movement lands here as a new
/// record chained to its predecessor by a blake3 hash; nothing is ever
/// rewritten in place, so history stays reconstructible and tamper-evident.
#[derive(Debug, Default, Clone)]
pub struct AppendOnlyJournal {
    entries: Vec<JournalEntry>,
}

impl AppendOnlyJournal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rehydrate from stored entries; the sequence and every hash must
    /// check out or the whole journal is rejected.
    pub fn from_entries(entries: Vec<JournalEntry>) -> Result<Self, EngineError> {
        let journal = Self { entries };

        for (position, entry) in journal.entries.iter().enumerate() {
            if entry.index != position as u64 {
                return Err(EngineError::Journal(format!(
                    "entry {} out of sequence at position {position}",
                    entry.index
                )));
            }
        }

        if !journal.verify_chain() {
            return Err(EngineError::Journal(
                "stored journal failed hash-chain verification".to_string(),
            ));
        }

        Ok(journal)
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn entries_for_entity(&self, entity_ref: &str) -> Vec<&JournalEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.entity_ref.as_deref() == Some(entity_ref))
            .collect()
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            let expected_hash = compute_entry_hash(
                entry.index,
                &entry.operation_id,
                &entry.kind,
                entry.entity_ref.as_deref(),
                entry.timestamp,
                &entry.payload,
                previous_hash.as_deref(),
            );
            if entry.entry_hash != expected_hash {
                return false;
            }
            if entry.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }

    pub fn append(
        &mut self,
        operation_id: &str,
        kind: JournalEntryKind,
        entity_ref: Option<String>,
        payload: Value,
    ) -> Result<JournalEntry, EngineError> {
        let entry = self.build_entry(operation_id, kind, entity_ref, payload)?;
        self.commit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Compute the entry that would extend the chain, leaving the chain
    /// itself untouched until `commit_entry`.
    pub fn build_entry(
        &self,
        operation_id: &str,
        kind: JournalEntryKind,
        entity_ref: Option<String>,
        payload: Value,
    ) -> Result<JournalEntry, EngineError> {
        let index = self.entries.len() as u64;
        let timestamp = Utc::now();
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(
            index,
            operation_id,
            &kind,
            entity_ref.as_deref(),
            timestamp,
            &payload,
            previous_hash.as_deref(),
        );

        Ok(JournalEntry {
            entry_id: Uuid::new_v4().to_string(),
            index,
            operation_id: operation_id.to_string(),
            kind,
            entity_ref,
            timestamp,
            payload,
            previous_hash,
            entry_hash,
        })
    }

    /// Extend the chain with an entry produced by `build_entry`, once any
    /// external mirror write for it has landed.
    pub fn commit_entry(&mut self, entry: JournalEntry) -> Result<(), EngineError> {
        let head = self.entries.len() as u64;
        if entry.index != head {
            return Err(EngineError::Journal(format!(
                "entry {} does not extend a chain of length {head}",
                entry.index
            )));
        }

        let head_hash = self.entries.last().map(|e| e.entry_hash.clone());
        if entry.previous_hash != head_hash {
            return Err(EngineError::Journal(
                "entry does not chain onto the current head".to_string(),
            ));
        }

        let recomputed = compute_entry_hash(
            entry.index,
            &entry.operation_id,
            &entry.kind,
            entry.entity_ref.as_deref(),
            entry.timestamp,
            &entry.payload,
            entry.previous_hash.as_deref(),
        );

        if entry.entry_hash != recomputed {
            return Err(EngineError::Journal(
                "entry hash does not match its material".to_string(),
            ));
        }

        self.entries.push(entry);
        Ok(())
    }
}

fn compute_entry_hash(
    index: u64,
    operation_id: &str,
    kind: &JournalEntryKind,
    entity_ref: Option<&str>,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "operation_id": operation_id,
        "kind": kind,
        "entity_ref": entity_ref,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_hash_chain() {
        let mut journal = AppendOnlyJournal::new();
        let transition = TransitionEvent::new("bid", "b-1", "pending", "accepted");
        journal
            .append(
                "op-1",
                JournalEntryKind::Transition,
                Some("bid:b-1".to_string()),
                serde_json::to_value(&transition).unwrap(),
            )
            .expect("transition appended");
        journal
            .append(
                "op-1",
                JournalEntryKind::Money,
                Some("wallet_account:a-1".to_string()),
                serde_json::to_value(MoneyEvent {
                    account_id: "a-1".to_string(),
                    transaction_id: "t-1".to_string(),
                    tx_type: "escrow_lock".to_string(),
                    amount_minor: -1000,
                    balance_after_minor: 0,
                })
                .unwrap(),
            )
            .expect("money appended");

        assert!(journal.verify_chain());
        assert_eq!(journal.entries_for_entity("bid:b-1").len(), 1);
    }

    #[test]
    fn detects_tampered_entries() {
        let mut journal = AppendOnlyJournal::new();
        journal
            .append(
                "op-2",
                JournalEntryKind::Note,
                None,
                serde_json::json!({"detail": "guard passed"}),
            )
            .expect("note appended");

        // Tamper outside of append APIs to validate proof behavior.
        let mut tampered = journal.clone();
        tampered.entries[0].payload = serde_json::json!({"tampered": true});

        assert!(!tampered.verify_chain());
    }

    #[test]
    fn entry_kind_tokens_parse_back() {
        for kind in [
            JournalEntryKind::Transition,
            JournalEntryKind::Money,
            JournalEntryKind::Note,
        ] {
            assert_eq!(kind.as_str().parse::<JournalEntryKind>().unwrap(), kind);
        }
        assert!("audit".parse::<JournalEntryKind>().is_err());
    }

    #[test]
    fn commit_rejects_out_of_order_entries() {
        let mut journal = AppendOnlyJournal::new();
        let first = journal
            .build_entry("op-3", JournalEntryKind::Note, None, serde_json::json!({}))
            .unwrap();
        journal.commit_entry(first.clone()).unwrap();
        let err = journal.commit_entry(first).unwrap_err();
        assert!(matches!(err, EngineError::Journal(_)));
    }
}
