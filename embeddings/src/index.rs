//! Vector index capability and the flat in-process backend.
//!
//! A [`VectorIndexBackend`] builds and loads immutable [`VectorIndex`]
//! values. Indexes are never mutated after `build`; a new corpus state
//! means a new index.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::check_dimension;
use crate::similarity::{dot_product, normalize, rank_top_k};

/// A search result: document id plus cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    /// Identifier the vector was built with.
    pub id: String,

    /// Cosine similarity with the query.
    pub score: f32,
}

/// A built, read-only vector index.
pub trait VectorIndex: Send + Sync {
    /// Dimensionality of stored vectors.
    fn dimension(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the `k` nearest ids by cosine similarity, ordered by
    /// descending score and then ascending id.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>>;

    /// Write the index to `path`.
    fn persist(&self, path: &Path) -> Result<()>;
}

/// Factory for [`VectorIndex`] values.
pub trait VectorIndexBackend: Send + Sync {
    /// Backend name, recorded with persisted snapshots.
    fn name(&self) -> &str;

    /// Build a fresh index from `(id, vector)` pairs.
    fn build(&self, dimension: usize, entries: Vec<(String, Embedding)>)
    -> Result<Box<dyn VectorIndex>>;

    /// Load an index previously written by [`VectorIndex::persist`].
    fn load(&self, path: &Path) -> Result<Box<dyn VectorIndex>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatEntry {
    id: String,
    embedding: Embedding,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatFile {
    dimension: usize,
    entries: Vec<FlatEntry>,
}

/// Exact cosine index over L2-normalised vectors.
///
/// Search is a linear scan; suitable for corpora up to ~100k documents.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<FlatEntry>,
}

impl FlatIndex {
    /// Build an index, normalising every vector.
    pub fn build(dimension: usize, entries: Vec<(String, Embedding)>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut flat = Vec::with_capacity(entries.len());

        for (id, mut embedding) in entries {
            check_dimension(dimension, &embedding)?;
            if !seen.insert(id.clone()) {
                return Err(EmbeddingError::CorruptIndex(format!("duplicate id: {id}")));
            }
            normalize(&mut embedding);
            flat.push(FlatEntry { id, embedding });
        }

        debug!("Built flat index with {} vectors (dim {dimension})", flat.len());
        Ok(Self {
            dimension,
            entries: flat,
        })
    }

    /// Serialize the index to JSON.
    pub fn to_json(&self) -> Result<String> {
        let file = FlatFile {
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Load index from JSON, validating every vector.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: FlatFile = serde_json::from_str(json)?;
        let entries = file
            .entries
            .into_iter()
            .map(|e| (e.id, e.embedding))
            .collect();
        let index = Self::build(file.dimension, entries)
            .map_err(|e| EmbeddingError::CorruptIndex(e.to_string()))?;
        info!("Loaded {} entries into flat index", index.len());
        Ok(index)
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        check_dimension(self.dimension, query)?;
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            scored.push((entry.id.clone(), dot_product(&query, &entry.embedding)?));
        }

        Ok(rank_top_k(scored, k)
            .into_iter()
            .map(|(id, score)| ScoredId { id, score })
            .collect())
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        debug!("Persisted flat index to {}", path.display());
        Ok(())
    }
}

/// Backend producing [`FlatIndex`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatIndexBackend;

impl VectorIndexBackend for FlatIndexBackend {
    fn name(&self) -> &str {
        "flat-cosine"
    }

    fn build(
        &self,
        dimension: usize,
        entries: Vec<(String, Embedding)>,
    ) -> Result<Box<dyn VectorIndex>> {
        Ok(Box::new(FlatIndex::build(dimension, entries)?))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn VectorIndex>> {
        let json = std::fs::read_to_string(path)?;
        Ok(Box::new(FlatIndex::from_json(&json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> Vec<(String, Embedding)> {
        vec![
            ("a".to_string(), vec![1.0, 0.0, 0.0]),
            ("b".to_string(), vec![0.0, 1.0, 0.0]),
            ("c".to_string(), vec![0.7, 0.7, 0.0]),
        ]
    }

    #[test]
    fn test_index_search() {
        let index = FlatIndex::build(3, sample()).unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
    }

    #[test]
    fn test_equal_scores_order_by_id() {
        let entries = vec![
            ("z".to_string(), vec![1.0, 0.0]),
            ("m".to_string(), vec![2.0, 0.0]),
            ("a".to_string(), vec![0.5, 0.0]),
        ];
        let index = FlatIndex::build(2, entries).unwrap();
        let ids: Vec<String> = index
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(FlatIndex::build(3, vec![("bad".to_string(), vec![1.0, 0.0])]).is_err());

        let index = FlatIndex::build(3, sample()).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let entries = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("a".to_string(), vec![0.0, 1.0]),
        ];
        assert!(matches!(
            FlatIndex::build(2, entries),
            Err(EmbeddingError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let empty = FlatIndex::build(3, Vec::new()).unwrap();
        assert!(empty.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        let index = FlatIndex::build(3, sample()).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_persist_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/index.json");

        let backend = FlatIndexBackend;
        let index = backend.build(3, sample()).unwrap();
        index.persist(&path).unwrap();

        let loaded = backend.load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(
            loaded.search(&[0.0, 1.0, 0.0], 1).unwrap()[0].id,
            "b".to_string()
        );
    }

    #[test]
    fn test_load_rejects_inconsistent_file() {
        let json = r#"{"dimension":3,"entries":[{"id":"a","embedding":[1.0]}]}"#;
        assert!(matches!(
            FlatIndex::from_json(json),
            Err(EmbeddingError::CorruptIndex(_))
        ));
    }
}
