//! Activity execution: each external side-effecting step of the pipeline
//! wrapped as an independently retryable unit.
//!
//! The [`executor::ActivityExecutor`] applies a per-attempt timeout and
//! the bounded exponential-backoff schedule from [`crate::retry`]. Errors
//! are classified (see [`ActivityError::is_retryable`]): transient causes
//! burn through the retry budget, permanent-content causes fail the first
//! attempt. Either way the caller receives a typed
//! [`ActivityFailed`] — exhaustion never loops forever inside the
//! executor, because exhaustion is the workflow's signal to suspend.

pub mod executor;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::services::ServiceError;
use crate::stores::StoreError;

pub use executor::ActivityExecutor;

/// The named side-effecting operations of the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOp {
    Download,
    ExtractText,
    PersistDocument,
    EmbedChunk,
}

impl fmt::Display for ActivityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityOp::Download => "download",
            ActivityOp::ExtractText => "extract_text",
            ActivityOp::PersistDocument => "persist_document",
            ActivityOp::EmbedChunk => "embed_chunk",
        };
        f.write_str(name)
    }
}

/// A single attempt's failure cause.
#[derive(Debug, Error, Diagnostic)]
pub enum ActivityError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("attempt timed out after {timeout:?}")]
    #[diagnostic(
        code(docloom::activity::timeout),
        help("Raise RetryPolicy::start_to_close_timeout if the operation is legitimately slow.")
    )]
    TimedOut { timeout: Duration },
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ActivityError::Service(err) => err.is_retryable(),
            // Store hiccups and slow attempts get the retry budget.
            ActivityError::Store(_) | ActivityError::TimedOut { .. } => true,
        }
    }
}

/// Terminal failure of an activity invocation: the retry budget is spent
/// (or the cause was not retryable to begin with).
#[derive(Debug, Error, Diagnostic)]
#[error("activity '{operation}' failed after {attempts} attempt(s): {cause}")]
#[diagnostic(code(docloom::activity::failed))]
pub struct ActivityFailed {
    pub operation: ActivityOp,
    pub attempts: u32,
    #[source]
    #[diagnostic_source]
    pub cause: ActivityError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceLocation;

    #[test]
    fn op_names_are_stable() {
        assert_eq!(ActivityOp::Download.to_string(), "download");
        assert_eq!(ActivityOp::EmbedChunk.to_string(), "embed_chunk");
        let json = serde_json::to_string(&ActivityOp::PersistDocument).unwrap();
        assert_eq!(json, "\"persist_document\"");
    }

    #[test]
    fn timeout_and_store_failures_are_retryable() {
        assert!(
            ActivityError::TimedOut {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(ActivityError::Store(StoreError::Storage("locked".into())).is_retryable());
        assert!(
            !ActivityError::Service(ServiceError::CorruptInput("bad".into())).is_retryable()
        );
        let not_found = ActivityError::Service(ServiceError::NotFound {
            location: SourceLocation::new("b", "missing"),
        });
        assert!(not_found.is_retryable());
    }
}
