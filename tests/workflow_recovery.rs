//! Recovery-loop behavior of the ingestion workflow: suspension after
//! retry exhaustion, resume signals, location corrections, restart from
//! checkpoints, and terminal classification.

mod common;

use std::sync::Arc;
use std::time::Duration;

use docloom::config::PipelineConfig;
use docloom::events::{ChannelSink, EventBus, WorkflowEventKind};
use docloom::retry::RetryPolicy;
use docloom::services::Utf8TextExtractor;
use docloom::stores::{MemoryVectorStore, VectorStore};
use docloom::types::{IngestStep, OutcomeStatus, SourceLocation};
use docloom::workflow::{
    Checkpointer, ExecutionStatus, IngestionRunner, InMemoryCheckpointer, RecoveryError,
    WorkflowError,
};

use common::{CountingEmbedder, FlakyObjectStore};

const ATTEMPTS: usize = 3;

fn test_config() -> PipelineConfig {
    PipelineConfig::default().with_retry(RetryPolicy::immediate())
}

struct Fixture {
    objects: FlakyObjectStore,
    embedder: CountingEmbedder,
    store: Arc<MemoryVectorStore>,
    checkpointer: Arc<InMemoryCheckpointer>,
    runner: IngestionRunner,
}

fn fixture_with_bus(event_bus: EventBus) -> Fixture {
    let objects = FlakyObjectStore::new();
    let embedder = CountingEmbedder::new(16);
    let store = Arc::new(MemoryVectorStore::new());
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let runner = IngestionRunner::builder(
        Arc::new(objects.clone()),
        Arc::new(Utf8TextExtractor),
        Arc::new(embedder.clone()),
        store.clone(),
    )
    .with_config(test_config())
    .with_checkpointer(checkpointer.clone())
    .with_event_bus(event_bus)
    .build();
    Fixture {
        objects,
        embedder,
        store,
        checkpointer,
        runner,
    }
}

fn fixture() -> Fixture {
    fixture_with_bus(EventBus::default())
}

async fn wait_until_suspended(handle: &docloom::workflow::ExecutionHandle) {
    for _ in 0..200 {
        if handle.is_suspended() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("execution never suspended; status: {:?}", handle.status());
}

#[tokio::test]
async fn exhausted_download_suspends_with_location_preserved() {
    let fx = fixture();
    fx.objects.put("bucket", "doc.txt", b"hello\n\nworld");
    fx.objects.fail_next(usize::MAX);

    let handle = fx.runner.start("bucket", "doc.txt").await.unwrap();
    wait_until_suspended(&handle).await;

    let record = handle.record();
    assert_eq!(record.status, ExecutionStatus::AwaitingRecovery);
    assert_eq!(record.source, SourceLocation::new("bucket", "doc.txt"));
    assert!(record.last_error.is_some());
    assert_eq!(fx.objects.attempt_count(), ATTEMPTS);

    // The suspension is durable: the checkpointer holds the same state.
    let persisted = fx.checkpointer.load(&record.id).await.unwrap().unwrap();
    assert_eq!(persisted.status, ExecutionStatus::AwaitingRecovery);
}

#[tokio::test]
async fn resume_signal_triggers_exactly_one_more_attempt_with_same_location() {
    let fx = fixture();
    fx.objects.put("bucket", "doc.txt", b"hello\n\nworld");
    fx.objects.fail_next(ATTEMPTS);

    let handle = fx.runner.start("bucket", "doc.txt").await.unwrap();
    wait_until_suspended(&handle).await;
    assert_eq!(fx.objects.attempt_count(), ATTEMPTS);

    handle.resume().await.unwrap();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    // Exactly one further download attempt, with the original location.
    assert_eq!(fx.objects.attempt_count(), ATTEMPTS + 1);
    let attempts = fx.objects.attempts();
    assert!(
        attempts
            .iter()
            .all(|loc| *loc == SourceLocation::new("bucket", "doc.txt"))
    );
}

#[tokio::test]
async fn corrected_location_is_used_acknowledged_and_recorded() {
    let fx = fixture();
    // The document only exists at the corrected location.
    fx.objects.put("right-bucket", "right.txt", b"alpha\n\nbeta");

    let handle = fx.runner.start("wrong-bucket", "wrong.txt").await.unwrap();
    wait_until_suspended(&handle).await;

    let acked = handle
        .correct_location("right-bucket", "right.txt")
        .await
        .unwrap();
    assert_eq!(acked, SourceLocation::new("right-bucket", "right.txt"));

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.chunks_processed, 2);

    // The execution's recorded location equals the corrected one.
    let record = handle.record();
    assert_eq!(record.source, SourceLocation::new("right-bucket", "right.txt"));
    // The next attempt after correction used the new location.
    let attempts = fx.objects.attempts();
    assert_eq!(
        attempts.last().unwrap(),
        &SourceLocation::new("right-bucket", "right.txt")
    );
    assert_eq!(
        attempts.iter().filter(|l| l.bucket == "right-bucket").count(),
        1
    );
}

#[tokio::test]
async fn recovery_commands_on_a_running_execution_are_rejected() {
    let fx = fixture();
    fx.objects.put("bucket", "doc.txt", b"text body");

    let handle = fx.runner.start("bucket", "doc.txt").await.unwrap();
    handle.wait().await.unwrap();

    assert_eq!(handle.resume().await, Err(RecoveryError::NotSuspended));
    assert_eq!(
        handle.correct_location("b", "p").await,
        Err(RecoveryError::NotSuspended)
    );
}

#[tokio::test]
async fn suspension_and_recovery_are_visible_on_the_event_stream() {
    let (tx, rx) = flume::unbounded();
    let fx = fixture_with_bus(EventBus::with_sink(ChannelSink::new(tx)));
    fx.objects.put("bucket", "doc.txt", b"payload");
    fx.objects.fail_next(ATTEMPTS);

    let handle = fx.runner.start("bucket", "doc.txt").await.unwrap();
    wait_until_suspended(&handle).await;
    handle.resume().await.unwrap();
    handle.wait().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert!(kinds.iter().any(|k| matches!(k, WorkflowEventKind::Suspended { .. })));
    assert!(kinds.iter().any(|k| matches!(k, WorkflowEventKind::Resumed)));
    assert!(
        kinds
            .iter()
            .any(|k| matches!(k, WorkflowEventKind::Completed { .. }))
    );
}

#[tokio::test]
async fn empty_extracted_text_completes_as_empty_document() {
    let fx = fixture();
    fx.objects.put("bucket", "blank.txt", b"  \n\t  \n ");

    let handle = fx.runner.start("bucket", "blank.txt").await.unwrap();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::EmptyDocument);
    assert_eq!(outcome.chunks_processed, 0);
    assert_eq!(outcome.document_id, None);
    // The embed step was never reached.
    assert_eq!(fx.embedder.call_count(), 0);
    assert_eq!(fx.store.document_count(), 0);
}

#[tokio::test]
async fn unsupported_format_fails_without_recovery() {
    let fx = fixture();
    fx.objects.put("bucket", "scan.pdf", b"%PDF-1.7 ...");

    let handle = fx.runner.start("bucket", "scan.pdf").await.unwrap();
    let err = handle.wait().await.unwrap_err();

    match err {
        WorkflowError::ExecutionFailed { failure, .. } => {
            assert_eq!(
                failure.operation,
                docloom::activities::ActivityOp::ExtractText
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(handle.status(), ExecutionStatus::Failed);
    // Download succeeded once; extraction failed on the first attempt
    // (permanent-content errors burn no retry budget).
    assert_eq!(fx.objects.attempt_count(), 1);
}

#[tokio::test]
async fn suspended_execution_survives_a_process_restart() {
    let fx = fixture();
    fx.objects.put("new-bucket", "doc.txt", b"one\n\ntwo\n\nthree");

    let handle = fx.runner.start("old-bucket", "doc.txt").await.unwrap();
    wait_until_suspended(&handle).await;

    // Simulate the process dying: kill the control loop outright.
    handle.cancel();

    // A fresh runner over the same checkpointer and store picks the
    // parked execution back up, still suspended.
    let runner = IngestionRunner::builder(
        Arc::new(fx.objects.clone()),
        Arc::new(Utf8TextExtractor),
        Arc::new(fx.embedder.clone()),
        fx.store.clone(),
    )
    .with_config(test_config())
    .with_checkpointer(fx.checkpointer.clone())
    .build();

    let handles = runner.resume_from_checkpoints().await.unwrap();
    assert_eq!(handles.len(), 1);
    let revived = &handles[0];
    wait_until_suspended(revived).await;

    let acked = revived
        .correct_location("new-bucket", "doc.txt")
        .await
        .unwrap();
    assert_eq!(acked, SourceLocation::new("new-bucket", "doc.txt"));
    let outcome = revived.wait().await.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.chunks_processed, 3);
}

#[tokio::test]
async fn crash_during_embedding_replays_without_duplicates() {
    let fx = fixture();
    fx.objects.put("bucket", "doc.txt", b"one\n\ntwo\n\nthree");

    let handle = fx.runner.start("bucket", "doc.txt").await.unwrap();
    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.chunks_processed, 3);
    let document_id = outcome.document_id.clone().unwrap();

    // Simulate a crash after persist but mid-embed: rewind the persisted
    // record to the embed step and relaunch. The replay re-persists the
    // document and re-embeds every chunk with the same identifiers.
    let mut record = fx.checkpointer.load(handle.id()).await.unwrap().unwrap();
    record.advance_to(IngestStep::EmbedChunks);
    record.outcome = None;
    fx.checkpointer.save(&record).await.unwrap();

    let runner = IngestionRunner::builder(
        Arc::new(fx.objects.clone()),
        Arc::new(Utf8TextExtractor),
        Arc::new(fx.embedder.clone()),
        fx.store.clone(),
    )
    .with_config(test_config())
    .with_checkpointer(fx.checkpointer.clone())
    .build();

    let handles = runner.resume_from_checkpoints().await.unwrap();
    assert_eq!(handles.len(), 1);
    let outcome = handles[0].wait().await.unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.document_id.as_ref(), Some(&document_id));

    // Same document id, same chunk identities: no duplicates anywhere.
    assert_eq!(fx.store.document_count(), 1);
    assert_eq!(fx.store.count_chunks().await.unwrap(), 3);
    let chunks = fx.store.chunks_for_document(&document_id).await.unwrap();
    let ordinals: Vec<usize> = chunks.iter().map(|c| c.ordinal_index).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}
