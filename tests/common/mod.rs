//! Shared test collaborators: scriptable failure injection around the
//! pipeline's external dependencies.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docloom::services::{Embedder, MockEmbedder, ObjectStore, ServiceError};
use docloom::types::SourceLocation;

/// In-memory object store that can be told to fail the next N fetches.
/// Every fetch attempt is logged so tests can assert exactly which
/// locations were tried, and how often.
#[derive(Clone, Default)]
pub struct FlakyObjectStore {
    objects: Arc<Mutex<Vec<(SourceLocation, Vec<u8>)>>>,
    fail_next: Arc<AtomicUsize>,
    attempts: Arc<Mutex<Vec<SourceLocation>>>,
}

impl FlakyObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, blob: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .push((SourceLocation::new(bucket, blob), bytes.to_vec()));
    }

    /// Fail the next `n` fetch attempts with a transient error, regardless
    /// of location.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<SourceLocation> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl ObjectStore for FlakyObjectStore {
    async fn fetch_bytes(&self, location: &SourceLocation) -> Result<Vec<u8>, ServiceError> {
        self.attempts.lock().push(location.clone());

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::TransientIo("injected failure".into()));
        }

        self.objects
            .lock()
            .iter()
            .find(|(loc, _)| loc == location)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ServiceError::NotFound {
                location: location.clone(),
            })
    }
}

/// Deterministic embedder that counts its calls.
#[derive(Clone)]
pub struct CountingEmbedder {
    inner: MockEmbedder,
    calls: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: MockEmbedder::new(dimensions),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Embedding service that is permanently down, for exercising the
/// zero-vector degradation path.
#[derive(Clone, Copy)]
pub struct DownEmbedder {
    pub dimensions: usize,
}

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::Unavailable {
            service: "embedding",
            message: "maintenance window".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
