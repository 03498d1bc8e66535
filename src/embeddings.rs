//! Embedding provider seam and vector helpers shared by the store.

use crate::error::{RagError, Result};

/// Maps texts to fixed-size, L2-normalized vectors.
pub trait Embedder: Send + Sync {
    /// Identifier persisted alongside vectors so a reload can detect a swap.
    fn model_id(&self) -> &str;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;

    /// Embeds a batch, returning one vector per input in the same order.
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single query string.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[query])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("embedder returned no vector for query".to_string()))
    }
}

/// Scales `vector` to unit length in place; zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity of two equally sized vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_stays_zero() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
        assert_eq!(cosine_similarity(&v, &[1.0, 0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }
}
