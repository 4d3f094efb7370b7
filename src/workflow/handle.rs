//! Client-side handle to a running execution: status snapshots, the
//! recovery channel, and outcome waiting.
//!
//! Recovery commands do not mutate the execution directly — they are
//! enqueued and applied serially by the execution's own control loop, the
//! single writer of its state. Each command carries the `recovery_epoch`
//! the sender observed, so a command aimed at an earlier suspension is
//! rejected as stale instead of silently applied to a later one.

use miette::Diagnostic;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::execution::{ExecutionRecord, ExecutionStatus, FailureInfo};
use crate::types::{ExecutionId, IngestionOutcome, SourceLocation};

/// Intents delivered to a suspended execution.
#[derive(Debug)]
pub(crate) enum RecoveryCommand {
    /// Retry with the current location.
    Resume {
        epoch: u64,
        reply: oneshot::Sender<Result<(), RecoveryError>>,
    },
    /// Overwrite the source location, then retry. The acknowledgement
    /// carries the corrected values.
    CorrectLocation {
        epoch: u64,
        source: SourceLocation,
        reply: oneshot::Sender<Result<SourceLocation, RecoveryError>>,
    },
}

impl RecoveryCommand {
    /// Answer a command that cannot be applied in the current state.
    pub(crate) fn reject(self, error: RecoveryError) {
        match self {
            RecoveryCommand::Resume { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            RecoveryCommand::CorrectLocation { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Why a recovery command was not applied.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("execution is not awaiting recovery")]
    #[diagnostic(
        code(docloom::recovery::not_suspended),
        help("Only a suspended execution accepts resume/correct-location commands.")
    )]
    NotSuspended,

    #[error("recovery command targets a stale suspension")]
    #[diagnostic(code(docloom::recovery::stale))]
    Stale,

    #[error("execution is no longer accepting commands")]
    #[diagnostic(code(docloom::recovery::closed))]
    Closed,
}

/// Failure surfaced when waiting on an execution's outcome.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error("execution {id} failed in '{}': {}", .failure.operation, .failure.message)]
    #[diagnostic(code(docloom::workflow::failed))]
    ExecutionFailed {
        id: ExecutionId,
        failure: FailureInfo,
    },

    #[error("execution {0} was cancelled")]
    #[diagnostic(code(docloom::workflow::cancelled))]
    Cancelled(ExecutionId),
}

/// Handle to one spawned ingestion execution.
#[derive(Clone)]
pub struct ExecutionHandle {
    id: ExecutionId,
    record_rx: watch::Receiver<ExecutionRecord>,
    commands: flume::Sender<RecoveryCommand>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        id: ExecutionId,
        record_rx: watch::Receiver<ExecutionRecord>,
        commands: flume::Sender<RecoveryCommand>,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            record_rx,
            commands,
            join: Arc::new(Mutex::new(Some(join))),
        }
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    /// Latest durable state snapshot.
    pub fn record(&self) -> ExecutionRecord {
        self.record_rx.borrow().clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.record_rx.borrow().status.clone()
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.status(), ExecutionStatus::AwaitingRecovery)
    }

    /// Signal a suspended execution to retry with its current location.
    pub async fn resume(&self) -> Result<(), RecoveryError> {
        let epoch = self.suspension_epoch()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(RecoveryCommand::Resume {
                epoch,
                reply: reply_tx,
            })
            .map_err(|_| RecoveryError::Closed)?;
        reply_rx.await.map_err(|_| RecoveryError::Closed)?
    }

    /// Deliver a corrected source location to a suspended execution and
    /// get the applied values back as acknowledgement.
    pub async fn correct_location(
        &self,
        bucket: impl Into<String>,
        blob: impl Into<String>,
    ) -> Result<SourceLocation, RecoveryError> {
        let epoch = self.suspension_epoch()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(RecoveryCommand::CorrectLocation {
                epoch,
                source: SourceLocation::new(bucket, blob),
                reply: reply_tx,
            })
            .map_err(|_| RecoveryError::Closed)?;
        reply_rx.await.map_err(|_| RecoveryError::Closed)?
    }

    fn suspension_epoch(&self) -> Result<u64, RecoveryError> {
        let record = self.record_rx.borrow();
        match record.status {
            ExecutionStatus::AwaitingRecovery => Ok(record.recovery_epoch),
            _ => Err(RecoveryError::NotSuspended),
        }
    }

    /// Wait until the execution reaches a terminal state.
    pub async fn wait(&self) -> Result<IngestionOutcome, WorkflowError> {
        let mut rx = self.record_rx.clone();
        loop {
            {
                let record = rx.borrow_and_update();
                match &record.status {
                    ExecutionStatus::Completed => {
                        let outcome = record
                            .outcome
                            .clone()
                            .expect("completed execution always carries an outcome");
                        return Ok(outcome);
                    }
                    ExecutionStatus::Failed => {
                        let failure = record.last_error.clone().unwrap_or(FailureInfo {
                            operation: crate::activities::ActivityOp::Download,
                            message: "unknown failure".into(),
                            at: chrono::Utc::now(),
                        });
                        return Err(WorkflowError::ExecutionFailed {
                            id: self.id.clone(),
                            failure,
                        });
                    }
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err(WorkflowError::Cancelled(self.id.clone()));
            }
        }
    }

    /// Abort the control loop. In-flight activity futures are dropped,
    /// which cancels their timers and I/O.
    pub fn cancel(&self) {
        if let Some(join) = self.join.lock().expect("join poisoned").take() {
            join.abort();
        }
    }
}
