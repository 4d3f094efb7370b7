//! SQLite [`VectorStore`] backend with vector search via `sqlite-vec`.
//!
//! Layout:
//!
//! * `documents(id, filename, content)` — one row per ingested document.
//! * `chunks(id, document_id, chunk_index, content)` — `id` is the
//!   derived storage key `document_id:chunk_index`, so replays overwrite.
//! * `chunk_embeddings(id, embedding)` — vectors stored in sqlite-vec's
//!   `vec_f32` blob form; cosine distance is computed inside SQLite.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use super::{StoreError, VectorStore};
use crate::types::{ChunkRecord, Document, DocumentId};

/// Durable store on a single SQLite file (or `:memory:` for tests).
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::initialize(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::initialize(conn).await
    }

    async fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            // Confirm the vec extension actually registered.
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                ?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                     id       TEXT PRIMARY KEY,
                     filename TEXT NOT NULL,
                     content  TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS chunks (
                     id          TEXT PRIMARY KEY,
                     document_id TEXT NOT NULL,
                     chunk_index INTEGER NOT NULL,
                     content     TEXT NOT NULL,
                     UNIQUE(document_id, chunk_index)
                 );
                 CREATE INDEX IF NOT EXISTS idx_chunks_document
                     ON chunks(document_id);
                 CREATE TABLE IF NOT EXISTS chunk_embeddings (
                     id        TEXT PRIMARY KEY,
                     embedding BLOB
                 );",
            )
            ?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), StoreError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(StoreError::Storage)
    }

    /// Underlying connection, for maintenance queries the trait does not
    /// cover.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn embedding_to_json(embedding: &[f32]) -> Result<String, StoreError> {
    serde_json::to_string(embedding).map_err(|err| StoreError::Serialization(err.to_string()))
}

fn embedding_from_json(raw: Option<String>) -> Result<Option<Vec<f32>>, StoreError> {
    raw.map(|json| {
        serde_json::from_str(&json).map_err(|err| StoreError::Serialization(err.to_string()))
    })
    .transpose()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let document = document.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (id, filename, content) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         filename = excluded.filename,
                         content  = excluded.content",
                    (
                        document.id.as_str(),
                        &document.filename,
                        &document.raw_text,
                    ),
                )
                ?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let id = id.clone();
        self.conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, filename, content FROM documents WHERE id = ?1",
                        [id.as_str()],
                        |row| {
                            Ok(Document {
                                id: DocumentId::from(row.get::<_, String>(0)?),
                                filename: row.get(1)?,
                                raw_text: row.get(2)?,
                            })
                        },
                    )
                    .optional()
                    ?;
                Ok(row)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))
    }

    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        let key = chunk.storage_key();
        let chunk = chunk.clone();
        let embedding_json = chunk.embedding.as_deref().map(embedding_to_json).transpose()?;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO chunks (id, document_id, chunk_index, content)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET content = excluded.content",
                    (
                        &key,
                        chunk.document_id.as_str(),
                        chunk.ordinal_index as i64,
                        &chunk.content,
                    ),
                )
                ?;
                if let Some(json) = embedding_json {
                    tx.execute(
                        "INSERT INTO chunk_embeddings (id, embedding)
                         VALUES (?1, vec_f32(?2))
                         ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                        (&key, &json),
                    )
                    ?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))
    }

    async fn chunks_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let id = id.clone();
        let rows: Vec<(String, i64, String, Option<String>)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT c.document_id, c.chunk_index, c.content,
                                vec_to_json(e.embedding)
                         FROM chunks c
                         LEFT JOIN chunk_embeddings e ON c.id = e.id
                         WHERE c.document_id = ?1
                         ORDER BY c.chunk_index ASC",
                    )
                    ?;
                let rows = stmt
                    .query_map([id.as_str()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })
                    ?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))?;

        rows.into_iter()
            .map(|(document_id, index, content, embedding)| {
                Ok(ChunkRecord {
                    document_id: DocumentId::from(document_id),
                    ordinal_index: index as usize,
                    content,
                    embedding: embedding_from_json(embedding)?,
                })
            })
            .collect()
    }

    async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, StoreError> {
        let query_json = embedding_to_json(query)?;
        let rows: Vec<(String, i64, String, Option<String>, f32)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.document_id, c.chunk_index, c.content,
                                vec_to_json(e.embedding),
                                vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance
                         FROM chunks c
                         JOIN chunk_embeddings e ON c.id = e.id
                         ORDER BY distance ASC
                         LIMIT {top_k}"
                    ))
                    ?;
                let rows = stmt
                    .query_map([&query_json], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })
                    ?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))?;

        rows.into_iter()
            .map(|(document_id, index, content, embedding, distance)| {
                let record = ChunkRecord {
                    document_id: DocumentId::from(document_id),
                    ordinal_index: index as usize,
                    content,
                    embedding: embedding_from_json(embedding)?,
                };
                // Cosine distance to similarity.
                Ok((record, 1.0 - distance))
            })
            .collect()
    }

    async fn count_chunks(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    ?;
                Ok(count as usize)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>| StoreError::Storage(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        Document {
            id: DocumentId::from("doc-1"),
            filename: "doc-1.txt".into(),
            raw_text: "alpha\n\nbeta".into(),
        }
    }

    #[tokio::test]
    async fn document_roundtrip_and_idempotent_insert() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let doc = sample_document();
        store.insert_document(&doc).await.unwrap();
        store.insert_document(&doc).await.unwrap();

        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn chunk_upsert_overwrites_by_identity() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let id = DocumentId::from("doc-1");
        let chunk = ChunkRecord::new(id.clone(), 0, "alpha").with_embedding(vec![1.0, 0.0, 0.0]);
        store.upsert_chunk(&chunk).await.unwrap();
        store.upsert_chunk(&chunk).await.unwrap();
        assert_eq!(store.count_chunks().await.unwrap(), 1);

        let chunks = store.chunks_for_document(&id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "alpha");
        assert_eq!(chunks[0].embedding, Some(vec![1.0, 0.0, 0.0]));
    }

    #[tokio::test]
    async fn similarity_search_orders_by_cosine_distance() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let id = DocumentId::from("doc-1");
        for (idx, embedding) in [
            vec![1.0f32, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]
        .into_iter()
        .enumerate()
        {
            store
                .upsert_chunk(
                    &ChunkRecord::new(id.clone(), idx, format!("chunk {idx}"))
                        .with_embedding(embedding),
                )
                .await
                .unwrap();
        }

        let hits = store.search_similar(&[0.1, 0.9, 0.1], 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0.content, "chunk 1");
        assert!(hits[0].1 > hits[1].1);
    }

    #[tokio::test]
    async fn top_k_limits_results() {
        let store = SqliteVectorStore::open_in_memory().await.unwrap();
        let id = DocumentId::from("doc-1");
        for idx in 0..10usize {
            store
                .upsert_chunk(
                    &ChunkRecord::new(id.clone(), idx, format!("chunk {idx}"))
                        .with_embedding(vec![idx as f32, 1.0]),
                )
                .await
                .unwrap();
        }
        let hits = store.search_similar(&[1.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 5);
    }
}
