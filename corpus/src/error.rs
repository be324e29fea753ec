//! Error types for corpus access.

use thiserror::Error;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors that can occur while reading the corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The corpus source could not be read at all.
    #[error("corpus source unavailable: {0}")]
    SourceUnavailable(String),

    /// No document with this id.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The source was readable but its content could not be parsed.
    #[error("malformed corpus: {0}")]
    Malformed(String),

    /// IO error while reading an already opened source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
