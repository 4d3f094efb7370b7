//! Workflow event stream: progress and recovery notifications fanned out
//! to pluggable sinks over a flume channel.
//!
//! The ingestion runner emits one [`WorkflowEvent`] per meaningful
//! transition. Operators watch the stream to learn that an execution is
//! suspended and needs a corrected location; tests attach a
//! [`ChannelSink`] and assert on the sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};

use crate::types::{ExecutionId, IngestStep, OutcomeStatus, SourceLocation};

/// One observable transition of a workflow execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub execution_id: ExecutionId,
    pub at: DateTime<Utc>,
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    pub fn now(execution_id: ExecutionId, kind: WorkflowEventKind) -> Self {
        Self {
            execution_id,
            at: Utc::now(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    Started { source: SourceLocation },
    StepStarted { step: IngestStep },
    Suspended { error: String },
    Resumed,
    LocationCorrected { source: SourceLocation },
    ChunkPersisted { ordinal_index: usize },
    Completed { status: OutcomeStatus, chunks_processed: usize },
    Failed { error: String },
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.execution_id)?;
        match &self.kind {
            WorkflowEventKind::Started { source } => write!(f, "started ({source})"),
            WorkflowEventKind::StepStarted { step } => write!(f, "step {step}"),
            WorkflowEventKind::Suspended { error } => {
                write!(f, "suspended awaiting recovery: {error}")
            }
            WorkflowEventKind::Resumed => f.write_str("resume requested"),
            WorkflowEventKind::LocationCorrected { source } => {
                write!(f, "location corrected to {source}")
            }
            WorkflowEventKind::ChunkPersisted { ordinal_index } => {
                write!(f, "chunk {ordinal_index} persisted")
            }
            WorkflowEventKind::Completed {
                status,
                chunks_processed,
            } => write!(f, "completed ({status}, {chunks_processed} chunks)"),
            WorkflowEventKind::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Receives broadcast events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &WorkflowEvent) -> Result<(), String>;
}

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&mut self, event: &WorkflowEvent) -> Result<(), String> {
        tracing::info!(execution_id = %event.execution_id, "{event}");
        Ok(())
    }
}

/// Forwards events into a flume channel, e.g. for streaming to a UI or
/// asserting in tests.
pub struct ChannelSink {
    sender: flume::Sender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new(sender: flume::Sender<WorkflowEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &WorkflowEvent) -> Result<(), String> {
        self.sender
            .send(event.clone())
            .map_err(|err| err.to_string())
    }
}

/// Receives events from workflow executions and broadcasts to all sinks.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<WorkflowEvent>, flume::Receiver<WorkflowEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (e.g. per-observer streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    /// Sender side for producers (the ingestion runner).
    pub fn sender(&self) -> flume::Sender<WorkflowEvent> {
        self.event_channel.0.clone()
    }

    /// Spawn the background broadcast task. Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        // All senders dropped: nothing left to broadcast.
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks = sinks.lock().expect("sinks poisoned");
                            for sink in sinks.iter_mut() {
                                if let Err(err) = sink.handle(&event) {
                                    tracing::warn!(error = %err, "event sink failed");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the broadcast task, draining nothing further.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
