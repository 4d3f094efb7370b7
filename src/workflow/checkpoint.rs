//! Pluggable persistence for execution records.
//!
//! The runner checkpoints after every state transition, so whatever
//! backend sits behind this trait always holds the latest durable view of
//! each execution. On startup, [`Checkpointer::list_unfinished`] feeds
//! [`crate::workflow::IngestionRunner::resume_from_checkpoints`].

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::{Connection, OptionalExtension};

use super::execution::ExecutionRecord;
use crate::types::ExecutionId;

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint storage failure: {0}")]
    #[diagnostic(code(docloom::checkpoint::storage))]
    Storage(String),

    #[error("checkpoint serialization failure: {0}")]
    #[diagnostic(
        code(docloom::checkpoint::serde),
        help("The persisted record does not match the current ExecutionRecord shape.")
    )]
    Serde(#[from] serde_json::Error),
}

/// Durable storage of [`ExecutionRecord`]s.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist the latest state of an execution. Overwrites by id.
    async fn save(&self, record: &ExecutionRecord) -> Result<(), CheckpointError>;

    async fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>, CheckpointError>;

    /// All records that are not terminal — running or awaiting recovery.
    async fn list_unfinished(&self) -> Result<Vec<ExecutionRecord>, CheckpointError>;
}

/// Volatile checkpointer for tests and development.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    records: Arc<RwLock<FxHashMap<ExecutionId, ExecutionRecord>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), CheckpointError> {
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>, CheckpointError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn list_unfinished(&self) -> Result<Vec<ExecutionRecord>, CheckpointError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }
}

/// SQLite-backed checkpointer: one row per execution, the full record as
/// JSON plus a status column for the unfinished scan.
#[derive(Clone)]
pub struct SqliteCheckpointer {
    conn: Connection,
}

impl SqliteCheckpointer {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path)
            .await
            .map_err(|err| CheckpointError::Storage(err.to_string()))?;
        Self::initialize(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| CheckpointError::Storage(err.to_string()))?;
        Self::initialize(conn).await
    }

    async fn initialize(conn: Connection) -> Result<Self, CheckpointError> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS executions (
                     id         TEXT PRIMARY KEY,
                     terminal   INTEGER NOT NULL,
                     record     TEXT NOT NULL,
                     updated_at TEXT NOT NULL
                 );",
            )
            ?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| CheckpointError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), CheckpointError> {
        let id = record.id.to_string();
        let terminal = record.status.is_terminal() as i64;
        let json = serde_json::to_string(record)?;
        let updated_at = record.updated_at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO executions (id, terminal, record, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                         terminal   = excluded.terminal,
                         record     = excluded.record,
                         updated_at = excluded.updated_at",
                    (&id, terminal, &json, &updated_at),
                )
                ?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| CheckpointError::Storage(err.to_string()))
    }

    async fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>, CheckpointError> {
        let id = id.to_string();
        let json: Option<String> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT record FROM executions WHERE id = ?1",
                    [&id],
                    |row| row.get(0),
                )
                .optional()

            })
            .await
            .map_err(|err| CheckpointError::Storage(err.to_string()))?;
        json.map(|j| serde_json::from_str(&j).map_err(CheckpointError::from))
            .transpose()
    }

    async fn list_unfinished(&self) -> Result<Vec<ExecutionRecord>, CheckpointError> {
        let rows: Vec<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT record FROM executions
                         WHERE terminal = 0
                         ORDER BY updated_at ASC",
                    )
                    ?;
                let rows = stmt
                    .query_map([], |row| row.get(0))
                    ?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| CheckpointError::Storage(err.to_string()))?;
        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(CheckpointError::from))
            .collect()
    }
}
