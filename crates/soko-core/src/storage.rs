use crate::error::EngineError;
use crate::journal::{AppendOnlyJournal, JournalEntry, JournalEntryKind};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

/// Where journal entries live beyond process memory.
#[derive(Debug, Clone, Default)]
pub enum JournalStorageConfig {
    #[default]
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl JournalStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }
}

/// The journal handle the engine writes through.
///
/// The in-memory chain is authoritative. When a Postgres mirror is
/// configured, each entry is inserted there before `commit_entry` extends
/// the chain, and bootstrap replays the mirrored rows through
/// `AppendOnlyJournal::from_entries` so a corrupted or reordered mirror is
/// rejected before the engine serves anything.
#[derive(Debug, Clone)]
pub struct PersistentJournal {
    chain: AppendOnlyJournal,
    mirror: Option<PostgresJournalStore>,
}

impl PersistentJournal {
    /// Rebuild a memory-only journal from previously stored entries.
    pub fn from_entries(entries: Vec<JournalEntry>) -> Result<Self, EngineError> {
        Ok(Self {
            chain: AppendOnlyJournal::from_entries(entries)?,
            mirror: None,
        })
    }

    pub async fn bootstrap(config: JournalStorageConfig) -> Result<Self, EngineError> {
        match config {
            JournalStorageConfig::Memory => Ok(Self {
                chain: AppendOnlyJournal::new(),
                mirror: None,
            }),
            JournalStorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresJournalStore::connect(&database_url, max_connections).await?;
                store.prepare_schema().await?;
                let chain = AppendOnlyJournal::from_entries(store.fetch_all().await?)?;
                Ok(Self {
                    chain,
                    mirror: Some(store),
                })
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        if self.mirror.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        self.chain.entries()
    }

    pub fn verify_chain(&self) -> bool {
        self.chain.verify_chain()
    }

    /// Append one entry: mirror write first, chain commit second.
    pub async fn append(
        &mut self,
        operation_id: &str,
        kind: JournalEntryKind,
        entity_ref: Option<String>,
        payload: serde_json::Value,
    ) -> Result<JournalEntry, EngineError> {
        let entry = self
            .chain
            .build_entry(operation_id, kind, entity_ref, payload)?;

        if let Some(store) = &self.mirror {
            store.persist(&entry).await?;
        }

        self.chain.commit_entry(entry.clone())?;
        Ok(entry)
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS soko_journal_entries (
        journal_index BIGINT PRIMARY KEY,
        entry_id TEXT NOT NULL UNIQUE,
        operation_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        entity_ref TEXT NULL,
        entry_timestamp TIMESTAMPTZ NOT NULL,
        payload JSONB NOT NULL,
        previous_hash TEXT NULL,
        entry_hash TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_soko_journal_operation_id \
     ON soko_journal_entries (operation_id)",
    "CREATE INDEX IF NOT EXISTS idx_soko_journal_entity_ref \
     ON soko_journal_entries (entity_ref)",
];

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, EngineError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| EngineError::Journal(format!("journal column {name}: {e}")))
}

/// One row per journal entry; index and hashes come from the chain, the
/// table never generates them.
#[derive(Debug, Clone)]
struct PostgresJournalStore {
    pool: PgPool,
}

impl PostgresJournalStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| EngineError::Journal(format!("journal database connect: {e}")))?;

        Ok(Self { pool })
    }

    async fn prepare_schema(&self) -> Result<(), EngineError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| EngineError::Journal(format!("journal schema: {e}")))?;
        }
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<JournalEntry>, EngineError> {
        let rows = sqlx::query(
            "SELECT journal_index, entry_id, operation_id, kind, entity_ref, \
             entry_timestamp, payload, previous_hash, entry_hash \
             FROM soko_journal_entries ORDER BY journal_index",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Journal(format!("journal load: {e}")))?;

        rows.iter().map(Self::decode_row).collect()
    }

    fn decode_row(row: &PgRow) -> Result<JournalEntry, EngineError> {
        let index: i64 = column(row, "journal_index")?;
        let kind: String = column(row, "kind")?;
        Ok(JournalEntry {
            entry_id: column(row, "entry_id")?,
            index: u64::try_from(index)
                .map_err(|_| EngineError::Journal(format!("negative journal index {index}")))?,
            operation_id: column(row, "operation_id")?,
            kind: kind.parse()?,
            entity_ref: column(row, "entity_ref")?,
            timestamp: column(row, "entry_timestamp")?,
            payload: column(row, "payload")?,
            previous_hash: column(row, "previous_hash")?,
            entry_hash: column(row, "entry_hash")?,
        })
    }

    async fn persist(&self, entry: &JournalEntry) -> Result<(), EngineError> {
        let index = i64::try_from(entry.index)
            .map_err(|_| EngineError::Journal("journal index exceeds BIGINT".to_string()))?;
        sqlx::query(
            "INSERT INTO soko_journal_entries (journal_index, entry_id, operation_id, \
             kind, entity_ref, entry_timestamp, payload, previous_hash, entry_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(index)
        .bind(&entry.entry_id)
        .bind(&entry.operation_id)
        .bind(entry.kind.as_str())
        .bind(&entry.entity_ref)
        .bind(entry.timestamp)
        .bind(&entry.payload)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Journal(format!("journal insert: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{AppendOnlyJournal, TransitionEvent};

    #[tokio::test]
    async fn append_extends_a_verified_chain() {
        let mut journal = PersistentJournal::bootstrap(JournalStorageConfig::memory())
            .await
            .unwrap();

        journal
            .append(
                "op-a",
                JournalEntryKind::Transition,
                Some("bid:b-1".to_string()),
                serde_json::to_value(TransitionEvent::new("bid", "b-1", "pending", "accepted"))
                    .unwrap(),
            )
            .await
            .unwrap();
        journal
            .append(
                "op-a",
                JournalEntryKind::Note,
                None,
                serde_json::json!({"detail": "escrow locked"}),
            )
            .await
            .unwrap();

        assert_eq!(journal.entries().len(), 2);
        assert_eq!(journal.backend_label(), "memory");
        assert!(journal.verify_chain());
    }

    #[test]
    fn rehydration_accepts_only_an_intact_chain() {
        let mut base = AppendOnlyJournal::new();
        let first = base
            .append(
                "op-a",
                JournalEntryKind::Note,
                None,
                serde_json::json!({"detail": "prepared"}),
            )
            .unwrap();
        base.append(
            "op-a",
            JournalEntryKind::Note,
            None,
            serde_json::json!({"detail": "done"}),
        )
        .unwrap();

        let rehydrated = PersistentJournal::from_entries(base.entries().to_vec()).unwrap();
        assert_eq!(rehydrated.entries().len(), 2);
        assert_eq!(rehydrated.entries()[0].entry_id, first.entry_id);
        assert!(rehydrated.verify_chain());

        let mut tampered = base.entries().to_vec();
        tampered[1].payload = serde_json::json!({"detail": "rewritten"});
        assert!(PersistentJournal::from_entries(tampered).is_err());
    }
}
