use async_trait::async_trait;
use roundledger_core::{EngineError, JournalEntry, RoundEngine};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Journal persistence backend configuration.
#[derive(Debug, Clone, Default)]
pub enum JournalStorageConfig {
    /// Persist nothing beyond the engine's own journal. Restarts begin at genesis.
    #[default]
    Memory,
    /// Mirror every entry to PostgreSQL and restore from it on startup.
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

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("journal storage: {0}")]
    Database(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Durable home of journal entries.
#[async_trait]
pub trait JournalStore: Send + Sync {
    fn label(&self) -> &'static str;

    /// Every stored entry, in index order.
    async fn load_entries(&self) -> Result<Vec<JournalEntry>, StorageError>;

    async fn insert_entry(
        &self,
        session_id: &str,
        entry: &JournalEntry,
    ) -> Result<(), StorageError>;
}

/// Keeps nothing. The engine's own journal is the only copy and a restart starts
/// from genesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralJournalStore;

#[async_trait]
impl JournalStore for EphemeralJournalStore {
    fn label(&self) -> &'static str {
        "memory"
    }

    async fn load_entries(&self) -> Result<Vec<JournalEntry>, StorageError> {
        Ok(Vec::new())
    }

    async fn insert_entry(
        &self,
        _session_id: &str,
        _entry: &JournalEntry,
    ) -> Result<(), StorageError> {
        Ok(())
    }
}

impl JournalStorageConfig {
    pub async fn open(&self) -> Result<Arc<dyn JournalStore>, StorageError> {
        match self {
            Self::Memory => Ok(Arc::new(EphemeralJournalStore)),
            Self::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresJournalStore::connect(database_url, *max_connections).await?;
                store.ensure_schema().await?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Ships engine journal entries to a [`JournalStore`].
///
/// The store holds one chain. On startup the stored entries are handed back so the
/// engine can be restored from them, and shipping resumes right after them. Each
/// process run tags the rows it writes with its own session id.
pub struct JournalMirror {
    store: Arc<dyn JournalStore>,
    session_id: String,
    shipped: u64,
    recovered: usize,
}

impl JournalMirror {
    /// Open a mirror over `store`. Returns the entries the store already holds.
    pub async fn bootstrap(
        store: Arc<dyn JournalStore>,
    ) -> Result<(Self, Vec<JournalEntry>), StorageError> {
        let stored = store.load_entries().await?;
        let mirror = Self {
            session_id: Uuid::new_v4().to_string(),
            shipped: stored.len() as u64,
            recovered: stored.len(),
            store,
        };
        info!(
            backend = mirror.backend_label(),
            session_id = %mirror.session_id,
            stored_entries = stored.len(),
            "journal mirror opened"
        );
        Ok((mirror, stored))
    }

    pub fn backend_label(&self) -> &'static str {
        self.store.label()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of engine entries already persisted, recovered ones included.
    pub fn shipped(&self) -> u64 {
        self.shipped
    }

    /// Entries the engine was restored from at startup.
    pub fn recovered_entries(&self) -> usize {
        self.recovered
    }

    /// Persist every engine entry not yet shipped. Returns how many were written.
    ///
    /// Stops at the first failed write; the remaining entries stay pending for the
    /// next call.
    pub async fn sync(&mut self, engine: &RoundEngine) -> Result<usize, StorageError> {
        let pending = engine.journal_since(self.shipped, usize::MAX)?;
        for entry in &pending {
            self.store.insert_entry(&self.session_id, entry).await?;
            self.shipped = entry.index + 1;
        }
        Ok(pending.len())
    }
}

#[derive(Debug, Clone)]
struct PostgresJournalStore {
    pool: PgPool,
}

impl PostgresJournalStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Database(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roundledger_journal (
                entry_index BIGINT PRIMARY KEY,
                entry_id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                event_name TEXT NOT NULL,
                recorded_at BIGINT NOT NULL,
                payload JSONB NOT NULL,
                previous_hash TEXT NULL,
                entry_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_roundledger_journal_event ON roundledger_journal (event_name)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("postgres index create failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl JournalStore for PostgresJournalStore {
    fn label(&self) -> &'static str {
        "postgres"
    }

    async fn load_entries(&self) -> Result<Vec<JournalEntry>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT
                entry_index,
                entry_id,
                recorded_at,
                payload,
                previous_hash,
                entry_hash
            FROM roundledger_journal
            ORDER BY entry_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("postgres load failed: {e}")))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let index: i64 = row
                .try_get("entry_index")
                .map_err(|e| decode_error("entry_index", e))?;
            let recorded_at: i64 = row
                .try_get("recorded_at")
                .map_err(|e| decode_error("recorded_at", e))?;
            let payload: serde_json::Value =
                row.try_get("payload").map_err(|e| decode_error("payload", e))?;

            entries.push(JournalEntry {
                entry_id: row.try_get("entry_id").map_err(|e| decode_error("entry_id", e))?,
                index: index.try_into().map_err(|_| {
                    StorageError::Database("negative journal index in storage".to_string())
                })?,
                recorded_at: recorded_at.try_into().map_err(|_| {
                    StorageError::Database("negative journal timestamp in storage".to_string())
                })?,
                event: serde_json::from_value(payload).map_err(|e| {
                    StorageError::Database(format!("postgres decode event failed: {e}"))
                })?,
                previous_hash: row
                    .try_get("previous_hash")
                    .map_err(|e| decode_error("previous_hash", e))?,
                entry_hash: row
                    .try_get("entry_hash")
                    .map_err(|e| decode_error("entry_hash", e))?,
            });
        }

        Ok(entries)
    }

    async fn insert_entry(
        &self,
        session_id: &str,
        entry: &JournalEntry,
    ) -> Result<(), StorageError> {
        let index: i64 = entry.index.try_into().map_err(|_| {
            StorageError::Database("journal index exceeds postgres BIGINT range".to_string())
        })?;
        let recorded_at: i64 = entry.recorded_at.try_into().map_err(|_| {
            StorageError::Database("journal timestamp exceeds postgres BIGINT range".to_string())
        })?;
        let payload = serde_json::to_value(&entry.event)
            .map_err(|e| StorageError::Database(format!("event encode failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO roundledger_journal (
                entry_index,
                entry_id,
                session_id,
                event_name,
                recorded_at,
                payload,
                previous_hash,
                entry_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(index)
        .bind(&entry.entry_id)
        .bind(session_id)
        .bind(entry.event.name())
        .bind(recorded_at)
        .bind(&payload)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("postgres insert failed: {e}")))?;

        Ok(())
    }
}

fn decode_error(column: &str, err: sqlx::Error) -> StorageError {
    StorageError::Database(format!("postgres decode {column} failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundledger_core::{tokens, AccountId, EngineConfig};

    const T0: u64 = 1_700_000_000;

    #[tokio::test]
    async fn memory_mirror_ships_only_new_entries() {
        let engine = RoundEngine::new(EngineConfig::default(), T0).unwrap();
        let store = JournalStorageConfig::memory().open().await.unwrap();
        let (mut mirror, stored) = JournalMirror::bootstrap(store).await.unwrap();
        assert!(stored.is_empty());
        assert_eq!(mirror.backend_label(), "memory");

        assert_eq!(mirror.sync(&engine).await.unwrap(), 1);
        engine
            .transfer(
                &AccountId::new("owner"),
                &AccountId::new("alice"),
                tokens(10),
                T0 + 1,
            )
            .unwrap();
        assert_eq!(mirror.sync(&engine).await.unwrap(), 1);
        assert_eq!(mirror.sync(&engine).await.unwrap(), 0);
        assert_eq!(mirror.shipped(), engine.journal_len().unwrap() as u64);
        assert_eq!(mirror.recovered_entries(), 0);
    }

    #[test]
    fn storage_labels() {
        assert_eq!(JournalStorageConfig::default().label(), "memory");
        assert_eq!(
            JournalStorageConfig::postgres("postgres://localhost/roundledger", 4).label(),
            "postgres"
        );
    }
}
