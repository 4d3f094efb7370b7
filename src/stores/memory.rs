//! In-process store backed by hash maps. Ranking goes through the same
//! cosine oracle as the query coordinator, so test assertions about
//! ordering transfer to the SQLite backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::{StoreError, VectorStore};
use crate::retrieval::rank_top_k;
use crate::types::{ChunkRecord, Document, DocumentId};

#[derive(Default)]
struct Inner {
    documents: FxHashMap<DocumentId, Document>,
    /// Keyed by `(document_id, ordinal_index)` — the dedup identity.
    chunks: FxHashMap<(DocumentId, usize), ChunkRecord>,
}

/// Volatile [`VectorStore`] for tests, demos, and development.
#[derive(Clone, Default)]
pub struct MemoryVectorStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (test hook).
    pub fn document_count(&self) -> usize {
        self.inner.read().documents.len()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.inner
            .write()
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().documents.get(id).cloned())
    }

    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .chunks
            .insert((chunk.document_id.clone(), chunk.ordinal_index), chunk.clone());
        Ok(())
    }

    async fn chunks_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut chunks: Vec<ChunkRecord> = self
            .inner
            .read()
            .chunks
            .values()
            .filter(|c| &c.document_id == id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal_index);
        Ok(chunks)
    }

    async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, StoreError> {
        let candidates: Vec<ChunkRecord> = self.inner.read().chunks.values().cloned().collect();
        Ok(rank_top_k(query, candidates, top_k))
    }

    async fn count_chunks(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().chunks.len())
    }
}
