//! Shared data model for the ingestion and retrieval pipeline.
//!
//! These types cross module boundaries: the workflow threads a
//! [`SourceLocation`] through its recovery loop, activities persist
//! [`Document`]s and [`ChunkRecord`]s, and the query path reads
//! [`ChunkRecord`]s back out of the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for a stored document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Mint a fresh identifier. The workflow does this once, before the
    /// persist step, so re-execution after a crash reuses the same id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier for one workflow execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(format!("ingest-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the source bytes of a document live in object storage.
///
/// Mutable only while the owning execution is suspended awaiting recovery;
/// the control loop is the single writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub bucket: String,
    pub blob: String,
}

impl SourceLocation {
    pub fn new(bucket: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            blob: blob.into(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.blob)
    }
}

/// A document record, created once text extraction succeeds. Immutable
/// thereafter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub raw_text: String,
}

/// A retrieval unit: one bounded span of a document's text, with its
/// embedding once computed.
///
/// Identity for dedup purposes is `(document_id, ordinal_index)` — the
/// store upserts on that key, so at-least-once re-execution of the embed
/// step overwrites instead of duplicating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: DocumentId,
    /// Position in the chunker's deterministic output order.
    pub ordinal_index: usize,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn new(
        document_id: DocumentId,
        ordinal_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            document_id,
            ordinal_index,
            content: content.into(),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Storage key derived from the dedup identity.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.document_id, self.ordinal_index)
    }
}

/// The sequential steps of one ingestion run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStep {
    Download,
    Extract,
    Persist,
    EmbedChunks,
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStep::Download => "download",
            IngestStep::Extract => "extract",
            IngestStep::Persist => "persist",
            IngestStep::EmbedChunks => "embed_chunks",
        };
        f.write_str(name)
    }
}

/// Terminal status of a completed ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The full pipeline ran and chunks were embedded and persisted.
    Completed,
    /// Extraction produced empty or whitespace-only text. A defined
    /// terminal outcome, not a failure.
    EmptyDocument,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Completed => f.write_str("completed"),
            OutcomeStatus::EmptyDocument => f.write_str("empty_document"),
        }
    }
}

/// What a finished execution produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    /// Absent when the document was empty and nothing was persisted.
    pub document_id: Option<DocumentId>,
    pub chunks_processed: usize,
    pub status: OutcomeStatus,
}

impl IngestionOutcome {
    pub fn completed(document_id: DocumentId, chunks_processed: usize) -> Self {
        Self {
            document_id: Some(document_id),
            chunks_processed,
            status: OutcomeStatus::Completed,
        }
    }

    pub fn empty_document() -> Self {
        Self {
            document_id: None,
            chunks_processed: 0,
            status: OutcomeStatus::EmptyDocument,
        }
    }
}
