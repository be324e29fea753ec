//! # Retrieval
//!
//! Incremental indexing and query-time retrieval over an immutable,
//! atomically swapped index snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Retrieval                                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  DocumentStore ──► FingerprintTracker ──► changed?               │
//! │        │                                     │ yes               │
//! │        ▼                                     ▼                   │
//! │  ┌──────────────┐   batches   ┌──────────────────────┐          │
//! │  │  Embedding   │ ◄────────── │   IndexingService    │          │
//! │  │  Provider    │ ──────────► │  (one build token)   │          │
//! │  └──────────────┘             └──────────────────────┘          │
//! │                                          │ persist + swap        │
//! │                                          ▼                       │
//! │                               ┌──────────────────────┐          │
//! │                               │ Arc<IndexSnapshot>   │          │
//! │                               └──────────────────────┘          │
//! │                                          │ lock-free read        │
//! │                                          ▼                       │
//! │                     Retriever ──► floor ──► Reranker ──► Hits    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use groundqa_retrieval::{IndexingService, IndexingConfig, Retrieve, Retriever, RetrieverConfig};
//!
//! let indexing = IndexingService::new(IndexingConfig::default(), store, embedder)?;
//! indexing.load_persisted().await?;
//! indexing.ensure_fresh().await?;
//!
//! let retriever = Retriever::new(indexing.clone(), RetrieverConfig::default())?;
//! let hits = retriever.retrieve("graph neural networks for molecules", 5).await?;
//! ```

pub mod config;
pub mod error;
pub mod indexing;
pub mod retriever;
pub mod snapshot;
pub mod text;

pub use config::{IndexingConfig, RerankMode, RetrieverConfig};
pub use error::{Result, RetrievalError};
pub use indexing::{IndexStatus, IndexingService, IndexingServiceBuilder, Refresh};
pub use retriever::{Hit, LexicalReranker, Reranker, Retrieve, Retriever};
pub use snapshot::{IndexSnapshot, SnapshotManifest};

// Re-export from dependencies for convenience
pub use groundqa_corpus::{Document, DocumentStore, Fingerprint, FingerprintTracker};
pub use groundqa_embeddings::{EmbeddingProvider, VectorIndexBackend};
