//! Application configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults,
//! 2. a TOML file (missing file means defaults),
//! 3. environment variables (`.env` is loaded first by the binary).
//!
//! ```toml
//! [corpus]
//! path = "./data/dataset.jsonl"
//!
//! # index_dir defaults to ./.cache/index, with or without an [index] section.
//! [index]
//! batch_size = 64
//! index_dir = "./.cache/index"
//!
//! [embedding]
//! backend = "ollama"
//! model = "nomic-embed-text"
//! dimension = 768
//!
//! [generation]
//! backend = "extractive"
//!
//! [retrieval]
//! min_similarity = 0.05
//! rerank = "lexical"
//!
//! [grounding]
//! budget = 6000
//! unit = "bytes"
//!
//! [qa]
//! top_k = 5
//! ungrounded = "fallback_message"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use groundqa_answer::{DEFAULT_GENERATION_MODEL, GroundingConfig, QaConfig};
use groundqa_embeddings::{DEFAULT_DIMENSION, OllamaConfig};
use groundqa_retrieval::{IndexingConfig, RetrieverConfig};
use serde::{Deserialize, Serialize};

/// Default corpus location.
pub const DEFAULT_DATA_PATH: &str = "./data/dataset.jsonl";

/// Default snapshot directory.
pub const DEFAULT_INDEX_DIR: &str = "./.cache/index";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub corpus: CorpusConfig,
    pub index: IndexingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrieverConfig,
    pub grounding: GroundingConfig,
    pub qa: QaConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            index: IndexingConfig::new().with_index_dir(DEFAULT_INDEX_DIR),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrieverConfig::default(),
            grounding: GroundingConfig::default(),
            qa: QaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// `.jsonl` or `.json` file holding the documents.
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATA_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Ollama,
    /// Deterministic offline vectors; no semantics.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimension: usize,
    /// Ollama host; `OLLAMA_HOST` or the local default when unset.
    pub host: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            host: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn ollama(&self) -> OllamaConfig {
        ollama_config(&self.model, self.host.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationBackend {
    Ollama,
    /// Quotes the best matching context sentences.
    Extractive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub model: String,
    pub host: Option<String>,
    /// Sentences quoted by the extractive generator.
    pub max_sentences: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::Ollama,
            model: DEFAULT_GENERATION_MODEL.to_string(),
            host: None,
            max_sentences: 3,
        }
    }
}

impl GenerationConfig {
    pub fn ollama(&self) -> OllamaConfig {
        ollama_config(&self.model, self.host.as_deref())
    }
}

fn ollama_config(model: &str, host: Option<&str>) -> OllamaConfig {
    let config = OllamaConfig::new(model);
    match host {
        Some(host) => config.with_host(host),
        None => config,
    }
}

impl AppConfig {
    /// Load `path` (defaults when the file does not exist) and apply
    /// process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if config.index.index_dir.is_none() {
            config.index.index_dir = Some(PathBuf::from(DEFAULT_INDEX_DIR));
        }
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`. Blank values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = var("DATA_PATH") {
            self.corpus.path = PathBuf::from(path);
        }
        if let Some(dir) = var("INDEX_DIR") {
            self.index.index_dir = Some(PathBuf::from(dir));
        }
        if let Some(host) = var("OLLAMA_HOST") {
            self.embedding.host = Some(host.clone());
            self.generation.host = Some(host);
        }
        if let Some(backend) = var("EMBEDDING_BACKEND") {
            self.embedding.backend = match backend.to_ascii_lowercase().as_str() {
                "ollama" => EmbeddingBackend::Ollama,
                "hash" => EmbeddingBackend::Hash,
                other => bail!("EMBEDDING_BACKEND must be 'ollama' or 'hash', got '{other}'"),
            };
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dim) = var("EMBEDDING_DIM") {
            self.embedding.dimension = dim
                .parse()
                .with_context(|| format!("EMBEDDING_DIM is not a number: {dim}"))?;
        }
        if let Some(backend) = var("GENERATION_BACKEND") {
            self.generation.backend = match backend.to_ascii_lowercase().as_str() {
                "ollama" => GenerationBackend::Ollama,
                "extractive" => GenerationBackend::Extractive,
                other => {
                    bail!("GENERATION_BACKEND must be 'ollama' or 'extractive', got '{other}'")
                }
            };
        }
        if let Some(model) = var("GENERATION_MODEL") {
            self.generation.model = model;
        }
        if let Some(min) = var("RAG_MIN_SIMILARITY") {
            let min: f32 = min
                .parse()
                .with_context(|| format!("RAG_MIN_SIMILARITY is not a number: {min}"))?;
            self.retrieval.min_similarity = min;
            self.grounding.min_similarity = min;
        }
        Ok(())
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be at least 1");
        }
        if self.generation.max_sentences == 0 {
            bail!("generation.max_sentences must be at least 1");
        }
        self.index.validate().context("Invalid [index] section")?;
        self.retrieval
            .validate()
            .context("Invalid [retrieval] section")?;
        self.grounding
            .validate()
            .context("Invalid [grounding] section")?;
        self.qa.validate().context("Invalid [qa] section")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundqa_answer::{BudgetUnit, UngroundedPolicy};
    use groundqa_retrieval::RerankMode;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::from_file(Path::new("/nonexistent/groundqa.toml")).unwrap();
        assert_eq!(config.corpus.path, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(config.index.index_dir, Some(PathBuf::from(DEFAULT_INDEX_DIR)));
        assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
        assert_eq!(config.embedding.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.qa.top_k, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groundqa.toml");
        std::fs::write(
            &path,
            r#"
[corpus]
path = "papers.json"

[embedding]
backend = "hash"
dimension = 64

[retrieval]
rerank = "lexical"

[grounding]
budget = 200
unit = "tokens"

[qa]
ungrounded = "restrict_citations"
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.corpus.path, PathBuf::from("papers.json"));
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.embedding.dimension, 64);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.retrieval.rerank, RerankMode::Lexical);
        assert_eq!(config.grounding.budget, 200);
        assert_eq!(config.grounding.unit, BudgetUnit::Tokens);
        assert_eq!(config.qa.ungrounded, UngroundedPolicy::RestrictCitations);
        assert_eq!(config.index.batch_size, 64);
        assert_eq!(config.index.index_dir, Some(PathBuf::from(DEFAULT_INDEX_DIR)));
    }

    #[test]
    fn test_index_section_without_dir_keeps_default_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groundqa.toml");
        std::fs::write(&path, "[index]\nbatch_size = 32\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.index.batch_size, 32);
        assert_eq!(config.index.index_dir, Some(PathBuf::from(DEFAULT_INDEX_DIR)));

        std::fs::write(&path, "[index]\nindex_dir = \"/srv/idx\"\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.index.index_dir, Some(PathBuf::from("/srv/idx")));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groundqa.toml");
        std::fs::write(&path, "[qa\ntop_k = ").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("DATA_PATH", "/data/papers.jsonl"),
                ("INDEX_DIR", "/tmp/idx"),
                ("OLLAMA_HOST", "http://gpu:11434"),
                ("EMBEDDING_BACKEND", "HASH"),
                ("EMBEDDING_DIM", "128"),
                ("GENERATION_BACKEND", "extractive"),
                ("GENERATION_MODEL", "qwen2.5:7b"),
                ("RAG_MIN_SIMILARITY", "0.2"),
                ("EMBEDDING_MODEL", "  "),
            ]))
            .unwrap();

        assert_eq!(config.corpus.path, PathBuf::from("/data/papers.jsonl"));
        assert_eq!(config.index.index_dir, Some(PathBuf::from("/tmp/idx")));
        assert_eq!(config.embedding.ollama().host, "http://gpu:11434");
        assert_eq!(config.generation.ollama().host, "http://gpu:11434");
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.embedding.dimension, 128);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.generation.backend, GenerationBackend::Extractive);
        assert_eq!(config.generation.model, "qwen2.5:7b");
        assert_eq!(config.retrieval.min_similarity, 0.2);
        assert_eq!(config.grounding.min_similarity, 0.2);
    }

    #[test]
    fn test_bad_env_values_are_rejected() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(env(&[("EMBEDDING_BACKEND", "openai")])).is_err());
        assert!(config.apply_env(env(&[("EMBEDDING_DIM", "wide")])).is_err());
        assert!(config.apply_env(env(&[("RAG_MIN_SIMILARITY", "high")])).is_err());
    }

    #[test]
    fn test_validate_catches_section_errors() {
        let mut config = AppConfig::default();
        config.qa.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.index.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }
}
