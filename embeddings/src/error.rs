//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Backend could not be reached or kept failing.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Batch length mismatch between inputs and returned vectors.
    #[error("batch length mismatch: sent {sent}, received {received}")]
    BatchMismatch { sent: usize, received: usize },

    /// Persisted index could not be used.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether this error means the backend itself could not be used,
    /// as opposed to a bad input or a bad persisted artifact.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Http(_))
    }
}
