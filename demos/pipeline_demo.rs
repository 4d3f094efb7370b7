//! End-to-end walkthrough: trigger an ingestion against a wrong location,
//! watch it suspend, correct the location, then ask a question.
//!
//! ```bash
//! cargo run --example pipeline_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use docloom::config::PipelineConfig;
use docloom::query::QueryCoordinator;
use docloom::retry::RetryPolicy;
use docloom::services::{FsObjectStore, MockEmbedder, MockGenerator, Utf8TextExtractor};
use docloom::stores::MemoryVectorStore;
use docloom::workflow::IngestionRunner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    docloom::telemetry::init();

    // A throwaway "bucket" on disk with one document in it.
    let root = std::env::temp_dir().join("docloom-demo");
    let bucket = root.join("reports");
    tokio::fs::create_dir_all(&bucket).await?;
    tokio::fs::write(
        bucket.join("q3.txt"),
        "Revenue grew twelve percent in Q3.\n\n\
         The growth was driven by the new ingestion product.\n\n\
         Churn stayed flat quarter over quarter.",
    )
    .await?;

    let embedder = Arc::new(MockEmbedder::default());
    let store = Arc::new(MemoryVectorStore::new());
    let runner = IngestionRunner::builder(
        Arc::new(FsObjectStore::new(&root)),
        Arc::new(Utf8TextExtractor),
        embedder.clone(),
        store.clone(),
    )
    .with_config(PipelineConfig::default().with_retry(
        // Short retries so the suspension shows up quickly.
        RetryPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            ..RetryPolicy::default()
        },
    ))
    .build();

    // Trigger with a typo'd blob name; downloads will exhaust and park.
    let handle = runner.start("reports", "q3-summary.txt").await?;
    while !handle.is_suspended() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    println!("execution suspended: {:?}", handle.record().last_error);

    // Operator fixes the location; the workflow resumes on its own.
    let acked = handle.correct_location("reports", "q3.txt").await?;
    println!("location corrected to {acked}");

    let outcome = handle.wait().await?;
    println!(
        "ingestion {}: {} chunks",
        outcome.status, outcome.chunks_processed
    );

    let coordinator = QueryCoordinator::new(embedder, Arc::new(MockGenerator), store, 5);
    let answer = coordinator.ask("What drove growth in Q3?").await?;
    println!("answer: {answer}");
    Ok(())
}
