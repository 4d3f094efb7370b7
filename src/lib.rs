//! # Docloom: Durable Document Ingestion and Retrieval
//!
//! Docloom ingests documents from object storage, splits them into
//! retrievable chunks, embeds and stores them, and answers questions by
//! retrieving the most relevant chunks for a generative model. The part
//! that earns its keep is durability: ingestion survives flaky external
//! dependencies through bounded automatic retries, and when those run out
//! it parks instead of failing — a human fixes the source location and the
//! workflow picks up where it stopped.
//!
//! ## Pipeline
//!
//! ```text
//! start(bucket, blob)
//!   │
//!   ▼
//! ObjectStore::fetch_bytes ──► TextExtractor::extract ──► VectorStore::insert_document
//!   │ retries exhausted                                          │
//!   ▼                                                            ▼
//! AwaitingRecovery ◄── resume() / correct_location()      chunker::chunk
//!   (suspended, checkpointed, zero compute)                      │
//!                                                                ▼
//!                                    Embedder::embed ──► VectorStore::upsert_chunk
//!
//! ask(question): Embedder::embed ──► retrieval::rank_top_k ──► Generator::generate
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docloom::services::{FsObjectStore, MockEmbedder, MockGenerator, Utf8TextExtractor};
//! use docloom::stores::MemoryVectorStore;
//! use docloom::workflow::IngestionRunner;
//! use docloom::query::QueryCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = Arc::new(MockEmbedder::default());
//! let store = Arc::new(MemoryVectorStore::new());
//!
//! let runner = IngestionRunner::builder(
//!     Arc::new(FsObjectStore::new("./uploads")),
//!     Arc::new(Utf8TextExtractor),
//!     embedder.clone(),
//!     store.clone(),
//! )
//! .build();
//!
//! let handle = runner.start("reports", "q3-summary.txt").await?;
//! let outcome = handle.wait().await?;
//! println!("{} chunks ingested", outcome.chunks_processed);
//!
//! let coordinator = QueryCoordinator::new(embedder, Arc::new(MockGenerator), store, 5);
//! let answer = coordinator.ask("What happened in Q3?").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Recovery
//!
//! A download that exhausts its retry budget suspends the execution
//! instead of failing it. The handle is the recovery channel:
//!
//! ```rust,no_run
//! # async fn example(handle: docloom::workflow::ExecutionHandle) -> Result<(), Box<dyn std::error::Error>> {
//! // Retry with the same location...
//! handle.resume().await?;
//! // ...or fix the location first; the acknowledgement echoes the
//! // corrected values.
//! let acked = handle.correct_location("right-bucket", "right/path.txt").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Suspension is indefinite and costs nothing: the control loop is parked
//! on a channel receive, the execution record is checkpointed, and
//! [`workflow::IngestionRunner::resume_from_checkpoints`] rebuilds parked
//! executions after a process restart.
//!
//! ## Module Guide
//!
//! - [`workflow`] - the durable ingestion state machine and its recovery
//!   contract
//! - [`activities`] - retrying executor around each side-effecting step
//! - [`chunker`] - deterministic text chunking
//! - [`retrieval`] - cosine ranking
//! - [`query`] - retrieval-augmented question answering
//! - [`services`] - collaborator traits and adapters
//! - [`stores`] - document/chunk storage backends
//! - [`events`] - workflow event stream
//! - [`retry`], [`config`], [`telemetry`], [`types`] - supporting pieces

pub mod activities;
pub mod chunker;
pub mod config;
pub mod events;
pub mod query;
pub mod retrieval;
pub mod retry;
pub mod services;
pub mod stores;
pub mod telemetry;
pub mod types;
pub mod workflow;
