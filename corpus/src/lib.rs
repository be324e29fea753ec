//! # Corpus
//!
//! Access to the document corpus and change detection for the indexing
//! service.
//!
//! ## Features
//!
//! - **Documents**: Stable-id corpus items mapped from JSON records
//! - **Document Stores**: Lazy, restartable document streams from JSONL/JSON
//!   files or memory
//! - **Fingerprints**: Deterministic content summaries used as the sole
//!   rebuild trigger
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Corpus                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  JSONL / JSON file ──► DocumentStore ──► DocumentStream        │
//! │                              │                                  │
//! │                              ▼                                  │
//! │                     FingerprintTracker ──► Fingerprint          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod document;
pub mod error;
pub mod fingerprint;
pub mod store;

pub use document::Document;
pub use error::{CorpusError, Result};
pub use fingerprint::{Fingerprint, FingerprintTracker, StoreFingerprintTracker};
pub use store::{DocumentStore, DocumentStream, FileStore, MemoryStore};
