//! The serializable state record of one ingestion execution.
//!
//! Every transition of the state machine is expressed as a method here and
//! checkpointed by the runner immediately after it is applied. No workflow
//! progress lives only on the call stack: a process restart rebuilds the
//! control loop from this record alone (see
//! [`ExecutionRecord::restart_step`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activities::ActivityOp;
use crate::types::{DocumentId, ExecutionId, IngestStep, IngestionOutcome, SourceLocation};

/// Lifecycle of one execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running { step: IngestStep },
    /// Automatic retries are exhausted; the execution is parked until a
    /// resume signal or a location correction arrives.
    AwaitingRecovery,
    Completed,
    /// Reserved for non-recoverable failures in steps past download.
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// The failure that parked or killed an execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub operation: ActivityOp,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Durable state of one ingestion execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    pub source: SourceLocation,
    pub last_error: Option<FailureInfo>,
    /// Bumped on every suspension. Recovery commands carry the epoch they
    /// observed; a command minted against an earlier suspension is stale
    /// and is rejected instead of applied.
    pub recovery_epoch: u64,
    /// Extracted text, cached after the extract step so a restarted
    /// process can resume at persist/embed without re-downloading.
    pub raw_text: Option<String>,
    /// Minted before the persist step so re-execution reuses the same id.
    pub document_id: Option<DocumentId>,
    pub outcome: Option<IngestionOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(id: ExecutionId, source: SourceLocation) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: ExecutionStatus::Running {
                step: IngestStep::Download,
            },
            source,
            last_error: None,
            recovery_epoch: 0,
            raw_text: None,
            document_id: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Current step, if running.
    pub fn step(&self) -> Option<IngestStep> {
        match self.status {
            ExecutionStatus::Running { step } => Some(step),
            _ => None,
        }
    }

    pub fn advance_to(&mut self, step: IngestStep) {
        self.status = ExecutionStatus::Running { step };
        self.touch();
    }

    /// Park the execution after download retries are exhausted.
    pub fn suspend(&mut self, failure: FailureInfo) {
        self.status = ExecutionStatus::AwaitingRecovery;
        self.last_error = Some(failure);
        self.recovery_epoch += 1;
        self.touch();
    }

    /// Re-enter the download step after a resume signal.
    pub fn resume(&mut self) {
        debug_assert_eq!(self.status, ExecutionStatus::AwaitingRecovery);
        self.status = ExecutionStatus::Running {
            step: IngestStep::Download,
        };
        self.touch();
    }

    /// Apply a corrected location. Only legal while suspended — the
    /// invariant that `source` is immutable outside recovery lives here.
    pub fn correct_location(&mut self, source: SourceLocation) -> SourceLocation {
        debug_assert_eq!(self.status, ExecutionStatus::AwaitingRecovery);
        self.source = source;
        self.touch();
        self.source.clone()
    }

    pub fn record_extracted_text(&mut self, text: String) {
        self.raw_text = Some(text);
        self.touch();
    }

    pub fn assign_document_id(&mut self) -> DocumentId {
        let id = self
            .document_id
            .get_or_insert_with(DocumentId::generate)
            .clone();
        self.touch();
        id
    }

    pub fn complete(&mut self, outcome: IngestionOutcome) {
        self.status = ExecutionStatus::Completed;
        self.outcome = Some(outcome);
        self.touch();
    }

    pub fn fail(&mut self, failure: FailureInfo) {
        self.status = ExecutionStatus::Failed;
        self.last_error = Some(failure);
        self.touch();
    }

    /// Where a reloaded execution should re-enter the pipeline.
    ///
    /// Raw bytes are never checkpointed, so an execution caught between
    /// download and extract restarts from download (both activities are
    /// idempotent). Once `raw_text` is cached the later steps resume in
    /// place. Suspended executions stay suspended until signalled.
    pub fn restart_step(&self) -> Option<IngestStep> {
        match self.status {
            ExecutionStatus::Running { step } => match step {
                IngestStep::Download | IngestStep::Extract => {
                    if self.raw_text.is_some() {
                        Some(IngestStep::Persist)
                    } else {
                        Some(IngestStep::Download)
                    }
                }
                IngestStep::Persist | IngestStep::EmbedChunks if self.raw_text.is_some() => {
                    Some(step)
                }
                // Text lost with the process: start over.
                IngestStep::Persist | IngestStep::EmbedChunks => Some(IngestStep::Download),
            },
            ExecutionStatus::AwaitingRecovery => None,
            ExecutionStatus::Completed | ExecutionStatus::Failed => None,
        }
    }
}
