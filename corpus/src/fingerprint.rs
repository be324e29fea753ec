//! Corpus fingerprinting.
//!
//! A [`Fingerprint`] summarises the whole corpus so the indexing service can
//! decide whether a rebuild is needed without embedding anything.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::store::DocumentStore;

/// Content summary of the corpus at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex-encoded content hash.
    pub value: String,

    /// Number of distinct documents.
    pub item_count: usize,

    /// When the fingerprint was computed.
    pub computed_at: DateTime<Utc>,
}

impl Fingerprint {
    /// Whether both fingerprints describe the same content.
    ///
    /// The computation timestamp is ignored.
    pub fn same_content(&self, other: &Fingerprint) -> bool {
        self.value == other.value && self.item_count == other.item_count
    }

    /// Abbreviated hash for logs.
    pub fn short(&self) -> &str {
        let end = self.value.len().min(12);
        &self.value[..end]
    }
}

/// Computes and compares corpus fingerprints.
#[async_trait]
pub trait FingerprintTracker: Send + Sync {
    /// Compute the fingerprint of the corpus as it is now.
    ///
    /// Fails with [`CorpusError::SourceUnavailable`](crate::CorpusError::SourceUnavailable)
    /// when the source cannot be read; that is never reported as "unchanged".
    async fn current(&self) -> Result<Fingerprint>;

    /// Whether the corpus differs from `previous`. An absent previous
    /// fingerprint always counts as changed.
    async fn was_changed(&self, previous: Option<&Fingerprint>) -> Result<bool> {
        let Some(previous) = previous else {
            return Ok(true);
        };
        let current = self.current().await?;
        Ok(!current.same_content(previous))
    }
}

/// Fingerprints a [`DocumentStore`] by hashing every streamed document.
///
/// The salt is mixed into the hash; pass the embedding space id so that
/// switching embedders also counts as a change.
pub struct StoreFingerprintTracker {
    store: Arc<dyn DocumentStore>,
    salt: String,
}

impl StoreFingerprintTracker {
    /// Create a tracker over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            salt: String::new(),
        }
    }

    /// Mix `salt` into every fingerprint.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }
}

#[async_trait]
impl FingerprintTracker for StoreFingerprintTracker {
    async fn current(&self) -> Result<Fingerprint> {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0x1d]);

        let mut ids = HashSet::new();
        let mut documents = self.store.stream_documents();
        while let Some(doc) = documents.next().await {
            let doc = doc?;
            for field in [&doc.id, &doc.title, &doc.text] {
                hasher.update(field.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
            ids.insert(doc.id);
        }

        let fingerprint = Fingerprint {
            value: format!("{:x}", hasher.finalize()),
            item_count: ids.len(),
            computed_at: Utc::now(),
        };
        debug!(
            "Fingerprint of {}: {} ({} documents)",
            self.store.describe(),
            fingerprint.short(),
            fingerprint.item_count
        );
        Ok(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::error::CorpusError;
    use crate::store::{FileStore, MemoryStore};
    use pretty_assertions::assert_eq;

    fn corpus() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_documents(vec![
            Document::new("1", "One", "first"),
            Document::new("2", "Two", "second"),
        ]))
    }

    #[tokio::test]
    async fn test_fingerprint_is_deterministic() {
        let store = corpus();
        let tracker = StoreFingerprintTracker::new(store);

        let a = tracker.current().await.unwrap();
        let b = tracker.current().await.unwrap();
        assert!(a.same_content(&b));
        assert_eq!(a.item_count, 2);
        assert!(!tracker.was_changed(Some(&a)).await.unwrap());
    }

    #[tokio::test]
    async fn test_content_change_is_detected() {
        let store = corpus();
        let tracker = StoreFingerprintTracker::new(store.clone());
        let before = tracker.current().await.unwrap();

        store.upsert(Document::new("2", "Two", "second, edited"));
        assert!(tracker.was_changed(Some(&before)).await.unwrap());
        assert_eq!(tracker.current().await.unwrap().item_count, 2);
    }

    #[tokio::test]
    async fn test_field_boundaries_matter() {
        let a = StoreFingerprintTracker::new(Arc::new(MemoryStore::with_documents(vec![
            Document::new("1", "ab", "c"),
        ])));
        let b = StoreFingerprintTracker::new(Arc::new(MemoryStore::with_documents(vec![
            Document::new("1", "a", "bc"),
        ])));
        assert_ne!(
            a.current().await.unwrap().value,
            b.current().await.unwrap().value
        );
    }

    #[tokio::test]
    async fn test_salt_changes_fingerprint() {
        let plain = StoreFingerprintTracker::new(corpus());
        let salted = StoreFingerprintTracker::new(corpus()).with_salt("ollama:nomic:768");
        assert_ne!(
            plain.current().await.unwrap().value,
            salted.current().await.unwrap().value
        );
    }

    #[tokio::test]
    async fn test_absent_previous_counts_as_changed() {
        let tracker = StoreFingerprintTracker::new(corpus());
        assert!(tracker.was_changed(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_source_is_an_error_not_unchanged() {
        let tracker =
            StoreFingerprintTracker::new(Arc::new(FileStore::new("/missing/corpus.jsonl")));
        let previous = Fingerprint {
            value: "abc".to_string(),
            item_count: 0,
            computed_at: Utc::now(),
        };

        assert!(matches!(
            tracker.current().await,
            Err(CorpusError::SourceUnavailable(_))
        ));
        assert!(tracker.was_changed(Some(&previous)).await.is_err());
    }
}
