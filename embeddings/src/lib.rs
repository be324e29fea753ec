//! # Embeddings
//!
//! Embedding and vector-index capabilities consumed by the grounded QA core.
//!
//! ## Features
//!
//! - **Embedding Providers**: Map batches of text to fixed-length vectors
//! - **Vector Index Backends**: Build, persist, load and search vector indexes
//! - **Similarity Helpers**: Cosine similarity, normalisation, top-k ranking
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► VectorIndexBackend        │
//! │       │                    │              │                     │
//! │       ▼                    ▼              ▼                     │
//! │  Ollama/Hash          similarity      FlatIndex                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod ollama;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{FlatIndex, FlatIndexBackend, ScoredId, VectorIndex, VectorIndexBackend};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use provider::{EmbeddingProvider, HashEmbedder};
pub use similarity::normalize;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Default dimension used by the offline hash embedder (nomic-embed-text size).
pub const DEFAULT_DIMENSION: usize = 768;
