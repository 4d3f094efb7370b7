//! Deterministic in-process service fakes.
//!
//! Exposed publicly (not just under `#[cfg(test)]`) so demos and
//! downstream integration tests can run the full pipeline without any
//! remote dependency.

use async_trait::async_trait;

use super::{Embedder, Generator, ServiceError};

/// Hash-based embedder: the same text always produces the same unit-norm
/// vector, and different texts almost always differ.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        // FNV-1a over the text seeds a tiny xorshift stream. Stable across
        // runs and platforms, which the determinism tests rely on.
        let mut seed: u64 = 0xcbf29ce484222325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x100000001b3);
        }
        if seed == 0 {
            seed = 0x9e3779b97f4a7c15;
        }

        let mut state = seed;
        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // Map to [-1, 1).
            vector.push((state as i64 as f64 / i64::MAX as f64) as f32);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Canned generator: echoes the question and reports whether any context
/// was retrieved. Mirrors the real service's contract of always producing
/// an answer body.
#[derive(Clone, Debug, Default)]
pub struct MockGenerator;

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String, ServiceError> {
        if context.trim().is_empty() {
            Ok(format!(
                "I don't know based on the provided documents. (question: {question})"
            ))
        } else {
            Ok(format!(
                "Answer to '{question}' drawn from {} context characters.",
                context.len()
            ))
        }
    }
}
