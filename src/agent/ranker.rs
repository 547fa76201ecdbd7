//! Cosine-similarity ranking over persisted chunk embeddings.

use std::cmp::Ordering;

/// Cosine similarity `dot(a,b) / (|a| * |b|)`, defined as 0.0 when either
/// vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Return at most `k` candidate ids ordered by descending similarity to
/// `query`. Ties keep the original candidate order (stable sort).
pub fn rank_by_similarity(query: &[f32], candidates: &[(i64, Vec<f32>)], k: usize) -> Vec<i64> {
    let mut scored: Vec<(f32, i64)> = candidates
        .iter()
        .map(|(id, embedding)| (cosine_similarity(query, embedding), *id))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored.into_iter().map(|(_, id)| id).collect()
}
