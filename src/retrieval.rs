//! Relevance ranking: cosine similarity and top-K selection.
//!
//! This is the leaf the query coordinator and the in-memory store share.
//! The SQLite backend pushes the same cosine metric into sqlite-vec so
//! both ranking paths agree on ordering.

use crate::types::ChunkRecord;

/// Cosine similarity in `[-1, 1]`. Mismatched lengths and zero-magnitude
/// vectors (the degraded-embedding placeholder) score `0.0` so they sort
/// behind every real match instead of poisoning the ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank `candidates` by similarity to `query` and keep the `top_k` best,
/// most similar first. Chunks without an embedding are skipped. Returns
/// all candidates when fewer than `top_k` exist.
pub fn rank_top_k(
    query: &[f32],
    candidates: impl IntoIterator<Item = ChunkRecord>,
    top_k: usize,
) -> Vec<(ChunkRecord, f32)> {
    let mut scored: Vec<(ChunkRecord, f32)> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_deref()?;
            let score = cosine_similarity(query, embedding);
            Some((chunk, score))
        })
        .collect();
    // Ties keep insertion order; NaN cannot occur (zero norms map to 0.0).
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}
