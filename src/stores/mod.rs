//! Storage backends for documents and chunk embeddings.
//!
//! The [`VectorStore`] trait abstracts over the durable store the
//! ingestion workflow writes into and the query coordinator reads from.
//! Two backends ship with the crate:
//!
//! * [`memory::MemoryVectorStore`] — in-process, for tests and demos.
//! * [`sqlite::SqliteVectorStore`] — SQLite with vector search via
//!   `sqlite-vec`.
//!
//! Write semantics are part of the durability contract: documents are
//! idempotent upserts by id, chunks are upserts keyed by
//! `(document_id, ordinal_index)`. Re-running a persist activity after a
//! crash therefore overwrites instead of duplicating.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::types::{ChunkRecord, Document, DocumentId};

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Errors surfaced by storage backends.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    #[diagnostic(code(docloom::store::storage))]
    Storage(String),

    #[error("serialization failure: {0}")]
    #[diagnostic(code(docloom::store::serialization))]
    Serialization(String),
}

/// Durable store contract: document inserts, chunk-with-vector upserts,
/// and top-K similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite a document by id. Idempotent.
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Insert or overwrite a chunk by `(document_id, ordinal_index)`.
    /// Overwrite-replace is the only permitted mutation of a stored
    /// embedding.
    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    /// All chunks of one document, ordered by ordinal index.
    async fn chunks_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Top-K chunks by similarity to `query`, most similar first.
    /// Returns fewer than `top_k` when the corpus is smaller.
    async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, StoreError>;

    /// Total number of stored chunks.
    async fn count_chunks(&self) -> Result<usize, StoreError>;
}
