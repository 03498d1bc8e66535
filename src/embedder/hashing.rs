//! Offline feature-hashing embedder.
//!
//! Lowercased word tokens and adjacent word pairs are hashed with CRC32 into a
//! fixed number of signed buckets, then the vector is L2-normalized. Output is
//! deterministic across runs and machines, so persisted indexes stay valid.

use crc32fast::Hasher as Crc32;

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{RagError, Result};

/// Default bucket count, matching the width of common sentence encoders.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 768;

/// Bag-of-words embedder that needs no network or model files.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    /// Builds an embedder with `dimensions` buckets.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::InvalidInput(
                "hashing embedder needs at least one dimension".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model_id: format!("hashing-crc32-{dimensions}"),
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens: Vec<String> = text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect();
        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, joined.as_bytes(), 0.5);
        }
        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = Crc32::new();
        hasher.update(feature);
        let hash = hasher.finalize();
        let bucket = ((hash >> 1) as usize) % self.dimensions;
        let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
            model_id: format!("hashing-crc32-{DEFAULT_HASHING_DIMENSIONS}"),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}
