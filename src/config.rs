//! Pipeline configuration.
//!
//! Everything tunable in one place: chunking geometry, the activity retry
//! policy, embedding dimensionality, retrieval depth, and embed-step
//! concurrency. `PipelineConfig::from_env` layers `.env`/environment
//! overrides on top of the defaults.

use crate::chunker::ChunkingConfig;
use crate::retry::RetryPolicy;

/// Tunables shared by the ingestion runner and the query coordinator.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub retry: RetryPolicy,
    /// Length of every embedding vector; the degraded zero-vector
    /// placeholder is sized from this.
    pub embedding_dimensions: usize,
    /// How many chunks the query coordinator retrieves.
    pub top_k: usize,
    /// Concurrent embed+persist calls within one embed step. Ordinal
    /// indexes are assigned before dispatch, so concurrency never affects
    /// chunk ordering.
    pub embed_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            retry: RetryPolicy::default(),
            embedding_dimensions: 768,
            top_k: 5,
            embed_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied. Reads `.env` if
    /// present. Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(dims) = env_usize("DOCLOOM_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = dims;
        }
        if let Some(top_k) = env_usize("DOCLOOM_TOP_K") {
            config.top_k = top_k.max(1);
        }
        if let Some(concurrency) = env_usize("DOCLOOM_EMBED_CONCURRENCY") {
            config.embed_concurrency = concurrency.max(1);
        }
        config
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

/// Database path for the SQLite store/checkpointer, from
/// `DOCLOOM_DB_PATH` with a local-file fallback.
pub fn sqlite_db_path() -> String {
    dotenvy::dotenv().ok();
    std::env::var("DOCLOOM_DB_PATH").unwrap_or_else(|_| "docloom.db".to_string())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}
