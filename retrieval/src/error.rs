//! Error types for indexing and retrieval.

use groundqa_corpus::CorpusError;
use groundqa_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while indexing or retrieving.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The corpus source could not be read.
    #[error("corpus source unavailable: {0}")]
    SourceUnavailable(String),

    /// A rebuild was aborted; the previously published snapshot is intact.
    #[error("index rebuild failed: {0}")]
    RebuildFailed(String),

    /// The embedding backend could not be reached.
    #[error("embedding capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// No snapshot has been published yet.
    #[error("no index snapshot is available yet")]
    NotReady,

    /// The query cannot be served.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The snapshot was built in a different embedding space than the
    /// query embedder.
    #[error("embedding space mismatch: index built with {index}, queries use {query}")]
    SpaceMismatch { index: String, query: String },

    /// Persisted snapshot could not be written or read.
    #[error("snapshot persistence error: {0}")]
    Persistence(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Corpus error other than an unreadable source.
    #[error("corpus error: {0}")]
    Corpus(CorpusError),

    /// Embedding error other than an unreachable backend.
    #[error("embedding error: {0}")]
    Embedding(EmbeddingError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Whether an external capability (corpus source or embedder) was
    /// unreachable, as opposed to a bad request or a failed build.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnavailable(_) | Self::SourceUnavailable(_)
        )
    }
}

impl From<CorpusError> for RetrievalError {
    fn from(err: CorpusError) -> Self {
        match err {
            CorpusError::SourceUnavailable(msg) => Self::SourceUnavailable(msg),
            other => Self::Corpus(other),
        }
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        if err.is_unavailable() {
            Self::CapabilityUnavailable(err.to_string())
        } else {
            Self::Embedding(err)
        }
    }
}
