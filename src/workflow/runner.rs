//! The ingestion workflow runner: one control-loop task per execution.
//!
//! Each execution is a single logical thread. Its loop owns the
//! [`ExecutionRecord`], applies every transition itself (including the
//! recovery commands that arrive over the execution's command channel),
//! checkpoints after each transition, and publishes snapshots on a watch
//! channel for observers. Suspension is an awaited channel receive — a
//! parked execution consumes no worker until a human signals it.

use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::checkpoint::{Checkpointer, InMemoryCheckpointer};
use super::execution::{ExecutionRecord, ExecutionStatus, FailureInfo};
use super::handle::{ExecutionHandle, RecoveryCommand, RecoveryError};
use crate::activities::{ActivityError, ActivityExecutor, ActivityFailed, ActivityOp};
use crate::chunker;
use crate::config::PipelineConfig;
use crate::events::{EventBus, WorkflowEvent, WorkflowEventKind};
use crate::services::{Embedder, ObjectStore, ServiceError, TextExtractor};
use crate::stores::VectorStore;
use crate::types::{
    ChunkRecord, Document, ExecutionId, IngestStep, IngestionOutcome, SourceLocation,
};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Spawns and tracks ingestion executions.
pub struct IngestionRunner {
    deps: Arc<Collaborators>,
    executor: ActivityExecutor,
    config: PipelineConfig,
    checkpointer: Arc<dyn Checkpointer>,
    event_bus: EventBus,
    handles: Mutex<FxHashMap<ExecutionId, ExecutionHandle>>,
}

struct Collaborators {
    object_store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

/// Builder over the runner's collaborators and tunables.
pub struct IngestionRunnerBuilder {
    deps: Collaborators,
    config: PipelineConfig,
    checkpointer: Arc<dyn Checkpointer>,
    event_bus: EventBus,
}

impl IngestionRunner {
    /// Start building a runner from its four mandatory collaborators.
    pub fn builder(
        object_store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> IngestionRunnerBuilder {
        IngestionRunnerBuilder {
            deps: Collaborators {
                object_store,
                extractor,
                embedder,
                store,
            },
            config: PipelineConfig::default(),
            checkpointer: Arc::new(InMemoryCheckpointer::new()),
            event_bus: EventBus::default(),
        }
    }

    /// Trigger a new ingestion for `(bucket, blob)`.
    pub async fn start(
        &self,
        bucket: impl Into<String>,
        blob: impl Into<String>,
    ) -> Result<ExecutionHandle, super::checkpoint::CheckpointError> {
        let record = ExecutionRecord::new(
            ExecutionId::generate(),
            SourceLocation::new(bucket, blob),
        );
        self.checkpointer.save(&record).await?;
        Ok(self.spawn(record))
    }

    /// Handle of a live execution, if this runner is tracking it.
    pub fn handle(&self, id: &ExecutionId) -> Option<ExecutionHandle> {
        self.handles.lock().get(id).cloned()
    }

    /// Reload every unfinished execution from the checkpointer and
    /// relaunch its control loop. Suspended executions come back parked,
    /// awaiting the same recovery signals as before the restart.
    pub async fn resume_from_checkpoints(
        &self,
    ) -> Result<Vec<ExecutionHandle>, super::checkpoint::CheckpointError> {
        let mut handles = Vec::new();
        for mut record in self.checkpointer.list_unfinished().await? {
            if let Some(step) = record.restart_step() {
                record.advance_to(step);
                self.checkpointer.save(&record).await?;
            }
            info!(execution_id = %record.id, status = ?record.status, "resuming from checkpoint");
            handles.push(self.spawn(record));
        }
        Ok(handles)
    }

    /// Borrow the event bus, e.g. to attach sinks.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn spawn(&self, record: ExecutionRecord) -> ExecutionHandle {
        let id = record.id.clone();
        let (record_tx, record_rx) = tokio::sync::watch::channel(record.clone());
        let (command_tx, command_rx) = flume::unbounded();

        let loop_ctx = ControlLoop {
            deps: self.deps.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
            checkpointer: self.checkpointer.clone(),
            events: self.event_bus.sender(),
            record_tx,
            commands: command_rx,
        };
        let join = tokio::spawn(loop_ctx.drive(record));

        let handle = ExecutionHandle::new(id.clone(), record_rx, command_tx, join);
        self.handles.lock().insert(id, handle.clone());
        handle
    }
}

impl IngestionRunnerBuilder {
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn build(self) -> IngestionRunner {
        self.event_bus.listen();
        IngestionRunner {
            executor: ActivityExecutor::new(self.config.retry.clone()),
            deps: Arc::new(self.deps),
            config: self.config,
            checkpointer: self.checkpointer,
            event_bus: self.event_bus,
            handles: Mutex::new(FxHashMap::default()),
        }
    }
}

/// Everything one execution's control loop needs.
struct ControlLoop {
    deps: Arc<Collaborators>,
    executor: ActivityExecutor,
    config: PipelineConfig,
    checkpointer: Arc<dyn Checkpointer>,
    events: flume::Sender<WorkflowEvent>,
    record_tx: tokio::sync::watch::Sender<ExecutionRecord>,
    commands: flume::Receiver<RecoveryCommand>,
}

impl ControlLoop {
    #[instrument(skip_all, fields(execution_id = %record.id))]
    async fn drive(self, mut record: ExecutionRecord) {
        self.emit(&record, WorkflowEventKind::Started {
            source: record.source.clone(),
        });

        // Download bytes only live for the current process; a restart
        // re-enters at download instead (see ExecutionRecord::restart_step).
        let mut bytes: Option<Vec<u8>> = None;

        loop {
            let step = match &record.status {
                ExecutionStatus::Running { step } => {
                    // A command sent in the narrow window between a
                    // handle's status check and the loop leaving
                    // suspension lands here; answer it instead of letting
                    // the sender hang.
                    for command in self.commands.try_iter() {
                        command.reject(RecoveryError::NotSuspended);
                    }
                    *step
                }
                ExecutionStatus::AwaitingRecovery => {
                    if self.await_recovery(&mut record).await.is_err() {
                        // Every handle dropped: leave the execution parked
                        // in the checkpointer and end the task.
                        return;
                    }
                    self.publish(&record).await;
                    continue;
                }
                ExecutionStatus::Completed | ExecutionStatus::Failed => return,
            };

            self.emit(&record, WorkflowEventKind::StepStarted { step });
            match step {
                IngestStep::Download => {
                    let location = record.source.clone();
                    let object_store = self.deps.object_store.clone();
                    let result = self
                        .executor
                        .execute(ActivityOp::Download, || {
                            let location = location.clone();
                            let object_store = object_store.clone();
                            async move {
                                object_store
                                    .fetch_bytes(&location)
                                    .await
                                    .map_err(ActivityError::from)
                            }
                        })
                        .await;
                    match result {
                        Ok(payload) => {
                            bytes = Some(payload);
                            record.advance_to(IngestStep::Extract);
                        }
                        Err(failed) => {
                            // The one recoverable step: exhaustion parks
                            // the execution instead of failing it.
                            let failure = failure_info(&failed);
                            warn!(error = %failed, "download exhausted retries, suspending");
                            record.suspend(failure.clone());
                            self.emit(&record, WorkflowEventKind::Suspended {
                                error: failure.message,
                            });
                        }
                    }
                }
                IngestStep::Extract => {
                    let Some(payload) = bytes.clone() else {
                        // Bytes lost (resumed process): re-download.
                        record.advance_to(IngestStep::Download);
                        self.publish(&record).await;
                        continue;
                    };
                    let filename = record.source.blob.clone();
                    let extractor = self.deps.extractor.clone();
                    let result = self
                        .executor
                        .execute(ActivityOp::ExtractText, || {
                            let payload = payload.clone();
                            let filename = filename.clone();
                            let extractor = extractor.clone();
                            async move {
                                extractor
                                    .extract(&payload, &filename)
                                    .await
                                    .map_err(ActivityError::from)
                            }
                        })
                        .await;
                    match result {
                        Ok(text) if text.trim().is_empty() => {
                            // Defined terminal outcome, not a failure.
                            let outcome = IngestionOutcome::empty_document();
                            self.emit(&record, WorkflowEventKind::Completed {
                                status: outcome.status,
                                chunks_processed: 0,
                            });
                            record.complete(outcome);
                        }
                        Ok(text) => {
                            record.record_extracted_text(text);
                            record.advance_to(IngestStep::Persist);
                        }
                        Err(failed) => self.terminate(&mut record, failed),
                    }
                }
                IngestStep::Persist => {
                    let document = Document {
                        id: record.assign_document_id(),
                        filename: record.source.blob.clone(),
                        raw_text: record.raw_text.clone().unwrap_or_default(),
                    };
                    let store = self.deps.store.clone();
                    let result = self
                        .executor
                        .execute(ActivityOp::PersistDocument, || {
                            let document = document.clone();
                            let store = store.clone();
                            async move {
                                store
                                    .insert_document(&document)
                                    .await
                                    .map_err(ActivityError::from)
                            }
                        })
                        .await;
                    match result {
                        Ok(()) => record.advance_to(IngestStep::EmbedChunks),
                        Err(failed) => self.terminate(&mut record, failed),
                    }
                }
                IngestStep::EmbedChunks => {
                    let document_id = record.assign_document_id();
                    let text = record.raw_text.clone().unwrap_or_default();
                    let chunks = chunker::chunk_with(&text, &self.config.chunking);
                    match self.embed_all(&record, document_id.clone(), chunks).await {
                        Ok(count) => {
                            let outcome = IngestionOutcome::completed(document_id, count);
                            self.emit(&record, WorkflowEventKind::Completed {
                                status: outcome.status,
                                chunks_processed: count,
                            });
                            record.complete(outcome);
                        }
                        Err(failed) => self.terminate(&mut record, failed),
                    }
                }
            }

            self.publish(&record).await;
        }
    }

    /// Embed and persist every chunk, `embed_concurrency` at a time.
    /// Ordinals come from the chunker's output order, fixed before any
    /// dispatch, so concurrent completion cannot reorder them.
    async fn embed_all(
        &self,
        record: &ExecutionRecord,
        document_id: crate::types::DocumentId,
        chunks: Vec<String>,
    ) -> Result<usize, ActivityFailed> {
        let total = chunks.len();
        let mut stream = futures_util::stream::iter(chunks.into_iter().enumerate().map(
            |(ordinal_index, content)| {
                let chunk = ChunkRecord::new(document_id.clone(), ordinal_index, content);
                self.embed_one(record.id.clone(), chunk)
            },
        ))
        .buffer_unordered(self.config.embed_concurrency.max(1));

        while let Some(result) = stream.next().await {
            result?;
        }
        Ok(total)
    }

    async fn embed_one(
        &self,
        execution_id: ExecutionId,
        chunk: ChunkRecord,
    ) -> Result<(), ActivityFailed> {
        let embedder = self.deps.embedder.clone();
        let store = self.deps.store.clone();
        let chunk = Arc::new(chunk);
        self.executor
            .execute(ActivityOp::EmbedChunk, || {
                let embedder = embedder.clone();
                let store = store.clone();
                let chunk = chunk.clone();
                async move {
                    let embedding = embed_or_degrade(embedder.as_ref(), &chunk.content).await?;
                    let chunk = (*chunk).clone().with_embedding(embedding);
                    store.upsert_chunk(&chunk).await.map_err(ActivityError::from)
                }
            })
            .await?;
        self.events
            .send(WorkflowEvent::now(execution_id, WorkflowEventKind::ChunkPersisted {
                ordinal_index: chunk.ordinal_index,
            }))
            .ok();
        Ok(())
    }

    /// Block until a valid recovery command arrives and apply it.
    /// `Err` means every command sender is gone.
    async fn await_recovery(&self, record: &mut ExecutionRecord) -> Result<(), ()> {
        loop {
            let command = self.commands.recv_async().await.map_err(|_| ())?;
            match command {
                RecoveryCommand::Resume { epoch, reply }
                    if epoch == record.recovery_epoch =>
                {
                    record.resume();
                    let _ = reply.send(Ok(()));
                    self.emit(record, WorkflowEventKind::Resumed);
                    return Ok(());
                }
                RecoveryCommand::CorrectLocation { epoch, source, reply }
                    if epoch == record.recovery_epoch =>
                {
                    let acknowledged = record.correct_location(source);
                    record.resume();
                    let _ = reply.send(Ok(acknowledged.clone()));
                    self.emit(record, WorkflowEventKind::LocationCorrected {
                        source: acknowledged,
                    });
                    return Ok(());
                }
                stale => stale.reject(RecoveryError::Stale),
            }
        }
    }

    fn terminate(&self, record: &mut ExecutionRecord, failed: ActivityFailed) {
        let failure = failure_info(&failed);
        warn!(error = %failed, "execution failed");
        self.emit(record, WorkflowEventKind::Failed {
            error: failure.message.clone(),
        });
        record.fail(failure);
    }

    /// Push the latest record to observers and the checkpointer.
    async fn publish(&self, record: &ExecutionRecord) {
        self.record_tx.send_replace(record.clone());
        if let Err(err) = self.checkpointer.save(record).await {
            // The run continues on the in-memory state; durability is
            // degraded until the next successful save.
            warn!(execution_id = %record.id, error = %err, "checkpoint save failed");
        }
    }

    fn emit(&self, record: &ExecutionRecord, kind: WorkflowEventKind) {
        self.events
            .send(WorkflowEvent::now(record.id.clone(), kind))
            .ok();
    }
}

fn failure_info(failed: &ActivityFailed) -> FailureInfo {
    FailureInfo {
        operation: failed.operation,
        message: failed.to_string(),
        at: chrono::Utc::now(),
    }
}

/// Ingestion-path embedding degradation: an unavailable embedding service
/// yields a zero-vector placeholder so the document still lands in the
/// store. Retrieval quality for that chunk suffers until re-embedding;
/// the query path does not degrade this way.
async fn embed_or_degrade(
    embedder: &dyn Embedder,
    text: &str,
) -> Result<Vec<f32>, ActivityError> {
    match embedder.embed(text).await {
        Ok(vector) => Ok(vector),
        Err(ServiceError::Unavailable { service, message }) => {
            warn!(service, %message, "embedding degraded to zero vector");
            Ok(vec![0.0; embedder.dimensions()])
        }
        Err(err) => Err(ActivityError::from(err)),
    }
}
