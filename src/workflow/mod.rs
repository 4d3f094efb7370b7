//! The durable ingestion workflow: state machine, recovery channel, and
//! checkpointing.
//!
//! # Architecture
//!
//! ```text
//! IngestionRunner::start(bucket, blob)
//!        │ spawns one control-loop task per execution
//!        ▼
//! Running(Download) ──exhausted──► AwaitingRecovery ◄─── checkpointed,
//!        │ ▲                           │    │            zero compute
//!        │ └───────── resume() ────────┘    │
//!        │ ◄── correct_location(b, p) ──────┘
//!        ▼
//! Running(Extract) ──empty text──► Completed(empty_document)
//!        ▼
//! Running(Persist) ──► Running(EmbedChunks) ──► Completed(completed)
//!                                   │
//!                 any exhaustion ───┴──► Failed
//! ```
//!
//! Only the download step routes through human recovery: it is the step
//! that fails on a typo'd or rotated external location, which a corrected
//! `(bucket, blob)` can fix. Later steps fail on content problems a
//! location change cannot cure and terminate the execution instead.
//!
//! Every transition is applied by the execution's own control loop (the
//! single writer), checkpointed through a [`Checkpointer`], and observable
//! through [`ExecutionHandle`] snapshots and the event bus.

pub mod checkpoint;
pub mod execution;
pub mod handle;
pub mod runner;

pub use checkpoint::{CheckpointError, Checkpointer, InMemoryCheckpointer, SqliteCheckpointer};
pub use execution::{ExecutionRecord, ExecutionStatus, FailureInfo};
pub use handle::{ExecutionHandle, RecoveryError, WorkflowError};
pub use runner::{IngestionRunner, IngestionRunnerBuilder};
