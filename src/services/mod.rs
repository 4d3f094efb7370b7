//! Collaborator interfaces the pipeline depends on.
//!
//! Everything side-effecting and external lives behind one of these traits:
//! object retrieval, text extraction, the embedding service, and the
//! generation service. The workflow and query coordinator only see the
//! traits; adapters live in the submodules:
//!
//! * [`http`] — reqwest-backed embedding and generation clients.
//! * [`local`] — filesystem object store and UTF-8 text extractor.
//! * [`mock`] — deterministic in-process fakes for tests and demos.

pub mod http;
pub mod local;
pub mod mock;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::types::SourceLocation;

pub use http::{HttpEmbedder, HttpGenerator};
pub use local::{FsObjectStore, Utf8TextExtractor};
pub use mock::{MockEmbedder, MockGenerator};

/// Failure taxonomy for external collaborators.
///
/// The split drives retry classification: transient shapes are retried by
/// the activity executor, permanent-content shapes fail on the first
/// attempt, and a wrong source location is retried until exhaustion and
/// then handed to a human.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    /// The requested object does not exist at the given location. Usually
    /// a typo'd or rotated path, which is why exhausted retries route to
    /// the recovery loop instead of failing the workflow.
    #[error("object not found: {location}")]
    #[diagnostic(
        code(docloom::service::not_found),
        help("Check the bucket/blob pair; a suspended execution accepts a corrected location.")
    )]
    NotFound { location: SourceLocation },

    /// Network or service hiccup. Retried automatically.
    #[error("transient I/O failure: {0}")]
    #[diagnostic(code(docloom::service::transient_io))]
    TransientIo(String),

    /// The extractor cannot handle this input shape. Permanent.
    #[error("unsupported input format: {0}")]
    #[diagnostic(code(docloom::service::unsupported_format))]
    UnsupportedFormat(String),

    /// The input bytes are damaged. Permanent.
    #[error("corrupt input: {0}")]
    #[diagnostic(code(docloom::service::corrupt_input))]
    CorruptInput(String),

    /// A remote model service is down or overloaded.
    #[error("service unavailable ({service}): {message}")]
    #[diagnostic(code(docloom::service::unavailable))]
    Unavailable { service: &'static str, message: String },

    /// The remote service answered, but not in the shape we deserialize.
    /// Validated at the boundary so untyped data never travels inward.
    #[error("invalid response from {service}: {message}")]
    #[diagnostic(
        code(docloom::service::invalid_response),
        help("The remote payload did not match the expected schema.")
    )]
    InvalidResponse { service: &'static str, message: String },
}

impl ServiceError {
    /// Whether the activity executor should retry this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::NotFound { .. }
            | ServiceError::TransientIo(_)
            | ServiceError::Unavailable { .. } => true,
            ServiceError::UnsupportedFormat(_)
            | ServiceError::CorruptInput(_)
            | ServiceError::InvalidResponse { .. } => false,
        }
    }
}

/// Object retrieval: fetch the raw bytes of an uploaded document.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch_bytes(&self, location: &SourceLocation) -> Result<Vec<u8>, ServiceError>;
}

/// Text extraction from raw document bytes. PDF and other binary formats
/// are an extractor implementation's concern; the pipeline only sees the
/// extracted string.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ServiceError>;
}

/// Embedding service: text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    /// Dimensionality of every vector this embedder produces. The
    /// zero-vector degradation placeholder is sized from this.
    fn dimensions(&self) -> usize;
}

/// Generation service: answer a question given retrieved context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<String, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_matches_the_taxonomy() {
        assert!(
            ServiceError::NotFound {
                location: SourceLocation::new("b", "p")
            }
            .is_retryable()
        );
        assert!(ServiceError::TransientIo("reset".into()).is_retryable());
        assert!(
            ServiceError::Unavailable {
                service: "embedding",
                message: "503".into()
            }
            .is_retryable()
        );
        assert!(!ServiceError::UnsupportedFormat("pdf".into()).is_retryable());
        assert!(!ServiceError::CorruptInput("truncated".into()).is_retryable());
        assert!(
            !ServiceError::InvalidResponse {
                service: "embedding",
                message: "missing vector".into()
            }
            .is_retryable()
        );
    }
}
