//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::error::{EmbeddingError, Result};

/// Dot product of two vectors of equal length.
///
/// Equal to cosine similarity when both sides are unit vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Normalize an embedding to unit length. Zero vectors are left untouched.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Sort `(id, score)` pairs by descending score, breaking ties by ascending id,
/// and keep the first `k`.
pub fn rank_top_k(mut scored: Vec<(String, f32)>, k: usize) -> Vec<(String, f32)> {
    scored.sort_by(|(id_a, score_a), (id_b, score_b)| {
        (Reverse(OrderedFloat(*score_a)), id_a).cmp(&(Reverse(OrderedFloat(*score_b)), id_b))
    });
    scored.truncate(k);
    scored
}
