//! Configuration for indexing and retrieval.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration for the indexing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Documents per embedding call.
    pub batch_size: usize,

    /// Where snapshots are persisted. `None` keeps snapshots in memory only.
    pub index_dir: Option<PathBuf>,
}

impl IndexingConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            batch_size: 64,
            index_dir: None,
        }
    }

    /// Set the embedding batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Persist snapshots under `dir`.
    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = Some(dir.into());
        self
    }

    /// Check the configuration for values the service cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RetrievalError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional second-stage ordering of retrieved candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    /// Cosine order only.
    None,
    /// Blend cosine similarity with query-term overlap.
    Lexical,
}

/// Configuration for the retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Minimum cosine similarity a hit needs to be returned.
    pub min_similarity: f32,

    /// Raise the floor relative to the strongest candidates.
    pub adaptive_cutoff: bool,

    /// Upper bound for `k`; larger requests are clamped.
    pub max_k: usize,

    /// Reranking stage.
    pub rerank: RerankMode,

    /// Candidates fetched per requested hit when reranking.
    pub candidate_multiplier: usize,

    /// Weight of term overlap in the lexical reranker (0.0 to 1.0).
    pub lexical_weight: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.05,
            adaptive_cutoff: true,
            max_k: 50,
            rerank: RerankMode::None,
            candidate_multiplier: 4,
            lexical_weight: 0.3,
        }
    }
}

impl RetrieverConfig {
    /// Set the similarity floor.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Enable or disable the adaptive cutoff.
    pub fn with_adaptive_cutoff(mut self, enabled: bool) -> Self {
        self.adaptive_cutoff = enabled;
        self
    }

    /// Select the reranking stage.
    pub fn with_rerank(mut self, rerank: RerankMode) -> Self {
        self.rerank = rerank;
        self
    }

    /// Check the configuration for values the retriever cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(RetrievalError::Config(format!(
                "min_similarity must be within [-1, 1], got {}",
                self.min_similarity
            )));
        }
        if self.max_k == 0 {
            return Err(RetrievalError::Config("max_k must be at least 1".to_string()));
        }
        if self.candidate_multiplier == 0 {
            return Err(RetrievalError::Config(
                "candidate_multiplier must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lexical_weight) {
            return Err(RetrievalError::Config(format!(
                "lexical_weight must be within [0, 1], got {}",
                self.lexical_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(IndexingConfig::default().validate().is_ok());
        assert!(RetrieverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            IndexingConfig::new().with_batch_size(0).validate(),
            Err(RetrievalError::Config(_))
        ));
        assert!(matches!(
            RetrieverConfig::default().with_min_similarity(1.5).validate(),
            Err(RetrievalError::Config(_))
        ));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: RetrieverConfig = serde_json::from_str(r#"{"rerank": "lexical"}"#).unwrap();
        assert_eq!(config.rerank, RerankMode::Lexical);
        assert_eq!(config.max_k, 50);
    }
}
