//! Question answering over the ingested corpus.
//!
//! `ask` embeds the question, ranks stored chunks by similarity, joins the
//! top-K texts into a context block, and forwards `(question, context)` to
//! the generation service. Embedding failures propagate — a partial answer
//! is worse than an error — while generation failures degrade to an
//! error-carrying answer string so the ask surface always returns a body.

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::{Embedder, Generator, ServiceError};
use crate::stores::{StoreError, VectorStore};

/// Failures the caller of [`QueryCoordinator::ask`] can see.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    /// The question could not be embedded; retrieval cannot proceed.
    #[error("question embedding failed: {0}")]
    #[diagnostic(code(docloom::query::embedding))]
    Embedding(#[source] ServiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Coordinates the retrieval-augmented answer path.
pub struct QueryCoordinator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl QueryCoordinator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Answer `question` from the stored corpus.
    ///
    /// With zero stored chunks the context is empty and the generation
    /// service decides what to say (its contract is to decline gracefully).
    pub async fn ask(&self, question: &str) -> Result<String, QueryError> {
        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(QueryError::Embedding)?;

        let hits = self.store.search_similar(&query_vector, self.top_k).await?;
        debug!(requested = self.top_k, retrieved = hits.len(), "context retrieved");

        let context = hits
            .iter()
            .map(|(chunk, _)| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        match self.generator.generate(question, &context).await {
            Ok(answer) => Ok(answer),
            Err(err) => {
                // Degrade to an answer-shaped error so the surface always
                // returns a response body.
                warn!(error = %err, "generation failed, returning error answer");
                Ok(format!("Error generating response: {err}"))
            }
        }
    }
}
