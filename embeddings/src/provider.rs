//! Embedding providers.
//!
//! The [`EmbeddingProvider`] trait is the embedding capability consumed by
//! the indexing service and the retriever. The same provider must be used
//! at index time and query time; [`EmbeddingProvider::space_id`] names the
//! embedding space so callers can detect a mismatch.

use async_trait::async_trait;
use sha2::{Digest, Sha512};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::normalize;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model identifier used to produce vectors.
    fn model(&self) -> &str;

    /// Dimensionality of every returned vector.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        let vector = vectors.pop().ok_or(EmbeddingError::BatchMismatch {
            sent: 1,
            received: 0,
        })?;
        check_dimension(self.dimension(), &vector)?;
        Ok(vector)
    }

    /// Identifier of the embedding space (`provider:model:dimension`).
    fn space_id(&self) -> String {
        format!("{}:{}:{}", self.name(), self.model(), self.dimension())
    }
}

/// Verify that a vector has the expected dimensionality.
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Deterministic hash-based embedder for offline and test use.
///
/// Vectors are pseudo-random unit vectors derived from a SHA-512 digest
/// stream of the text. They carry no semantics: identical texts map to
/// identical vectors and nothing else is guaranteed.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create a hash embedder producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_vector(&self, text: &str) -> Embedding {
        let mut digest = Sha512::digest(text.as_bytes());
        let mut values = Vec::with_capacity(self.dimension);

        'fill: loop {
            for chunk in digest.chunks_exact(8) {
                if values.len() == self.dimension {
                    break 'fill;
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                let x = u64::from_le_bytes(bytes);
                values.push((x % 10_000_000) as f32 / 10_000_000.0);
            }
            if values.len() == self.dimension {
                break;
            }
            digest = Sha512::digest(digest);
        }

        if self.dimension > 0 {
            let mean = values.iter().sum::<f32>() / self.dimension as f32;
            for v in values.iter_mut() {
                *v -= mean;
            }
        }
        normalize(&mut values);
        values
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn model(&self) -> &str {
        "sha512-stream"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        debug!("Hash-embedding {} texts", texts.len());
        Ok(texts.iter().map(|t| self.hash_vector(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("graph neural networks").await.unwrap();
        let b = embedder.embed("graph neural networks").await.unwrap();
        let c = embedder.embed("protein folding").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_hash_embedder_produces_unit_vectors() {
        // 100 entries needs more than one 64-byte digest.
        let embedder = HashEmbedder::new(100);
        let v = embedder.embed("long vector").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_space_id() {
        let embedder = HashEmbedder::new(8);
        assert_eq!(embedder.space_id(), "hash:sha512-stream:8");
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[0.0, 1.0, 0.0]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.0]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
