//! Error types for answer orchestration.

use groundqa_retrieval::RetrievalError;
use thiserror::Error;

/// Result type alias for answer operations.
pub type Result<T> = std::result::Result<T, AnswerError>;

/// Errors that can occur while answering a query.
///
/// Insufficient evidence and ungrounded generations are not errors; they
/// resolve to a fallback [`Answer`](crate::Answer).
#[derive(Error, Debug)]
pub enum AnswerError {
    /// The query cannot be served.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A backing capability (retrieval or generation) could not be reached.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// No index snapshot is published yet.
    #[error("index not ready")]
    NotReady,

    /// Retrieval failed for another reason.
    #[error("retrieval error: {0}")]
    Retrieval(RetrievalError),

    /// The generator responded but the response was unusable.
    #[error("generation error: {0}")]
    Generation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnswerError {
    /// Whether an external capability was unreachable.
    pub fn is_capability_failure(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable(_) | Self::Http(_))
    }
}

impl From<RetrievalError> for AnswerError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::InvalidQuery(msg) => Self::InvalidQuery(msg),
            RetrievalError::NotReady => Self::NotReady,
            err if err.is_capability_failure() => Self::CapabilityUnavailable(err.to_string()),
            other => Self::Retrieval(other),
        }
    }
}
