//! Immutable index snapshots and their on-disk layout.
//!
//! A snapshot bundles a built vector index, the id→document mapping it was
//! built from and the corpus fingerprint. Snapshots are never mutated;
//! a changed corpus produces a new snapshot.
//!
//! On disk every snapshot lives in its own directory next to a `CURRENT`
//! pointer file:
//!
//! ```text
//! index_dir/
//! ├── CURRENT                 # "snapshot-<id>"
//! └── snapshot-<id>/
//!     ├── manifest.json
//!     ├── documents.json
//!     └── index.json
//! ```
//!
//! The pointer is replaced with a rename only after the whole directory is
//! written, so readers never see a partial snapshot.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use groundqa_corpus::{Document, Fingerprint};
use groundqa_embeddings::{ScoredId, VectorIndex, VectorIndexBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, RetrievalError};

const CURRENT_FILE: &str = "CURRENT";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const MANIFEST_FILE: &str = "manifest.json";
const DOCUMENTS_FILE: &str = "documents.json";
const INDEX_FILE: &str = "index.json";

/// Metadata persisted alongside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Snapshot id.
    pub id: String,

    /// Fingerprint of the corpus the snapshot was built from.
    pub fingerprint: Fingerprint,

    /// Embedding space (`provider:model:dimension`).
    pub space: String,

    /// Vector dimensionality.
    pub dimension: usize,

    /// Vector index backend name.
    pub backend: String,

    /// Number of documents.
    pub document_count: usize,

    /// Build completion time.
    pub built_at: DateTime<Utc>,
}

/// A fully built, queryable index.
pub struct IndexSnapshot {
    manifest: SnapshotManifest,
    index: Box<dyn VectorIndex>,
    documents: HashMap<String, Document>,
}

impl IndexSnapshot {
    /// Assemble a snapshot from a freshly built index.
    pub fn new(
        fingerprint: Fingerprint,
        space: impl Into<String>,
        backend: impl Into<String>,
        index: Box<dyn VectorIndex>,
        documents: HashMap<String, Document>,
    ) -> Self {
        let manifest = SnapshotManifest {
            id: Uuid::new_v4().simple().to_string(),
            fingerprint,
            space: space.into(),
            dimension: index.dimension(),
            backend: backend.into(),
            document_count: documents.len(),
            built_at: Utc::now(),
        };
        Self {
            manifest,
            index,
            documents,
        }
    }

    /// Snapshot id.
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Fingerprint of the corpus this snapshot reflects.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.manifest.fingerprint
    }

    /// Embedding space the vectors live in.
    pub fn space(&self) -> &str {
        &self.manifest.space
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    /// Build completion time.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.manifest.built_at
    }

    /// Persisted metadata.
    pub fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the snapshot indexes no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up an indexed document.
    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Nearest neighbours of `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        Ok(self.index.search(query, k)?)
    }

    /// Write the snapshot under `root` and make it the current one.
    ///
    /// Older snapshot directories are removed once the pointer is swapped.
    pub fn persist(&self, root: &Path) -> Result<PathBuf> {
        let dir_name = format!("{SNAPSHOT_PREFIX}{}", self.manifest.id);
        let dir = root.join(&dir_name);
        fs::create_dir_all(&dir).map_err(|e| {
            RetrievalError::Persistence(format!("create {}: {e}", dir.display()))
        })?;

        let mut documents: Vec<&Document> = self.documents.values().collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&self.manifest)?,
        )?;
        fs::write(dir.join(DOCUMENTS_FILE), serde_json::to_string(&documents)?)?;
        self.index
            .persist(&dir.join(INDEX_FILE))
            .map_err(|e| RetrievalError::Persistence(format!("write index: {e}")))?;

        let tmp = root.join(format!("{CURRENT_FILE}.tmp"));
        fs::write(&tmp, &dir_name)?;
        fs::rename(&tmp, root.join(CURRENT_FILE))?;
        info!("Persisted snapshot {} to {}", self.manifest.id, dir.display());

        remove_stale_snapshots(root, &dir_name);
        Ok(dir)
    }

    /// Load the snapshot `CURRENT` points to.
    ///
    /// Returns `Ok(None)` when nothing has been persisted under `root` yet.
    /// Inconsistent data is an error.
    pub fn load(root: &Path, backend: &dyn VectorIndexBackend) -> Result<Option<Self>> {
        let pointer = match fs::read_to_string(root.join(CURRENT_FILE)) {
            Ok(pointer) => pointer,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let dir = root.join(pointer.trim());

        let manifest: SnapshotManifest =
            serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        if manifest.backend != backend.name() {
            return Err(RetrievalError::Persistence(format!(
                "snapshot {} was built by backend {}, not {}",
                manifest.id,
                manifest.backend,
                backend.name()
            )));
        }

        let documents: Vec<Document> =
            serde_json::from_str(&fs::read_to_string(dir.join(DOCUMENTS_FILE))?)?;
        let index = backend
            .load(&dir.join(INDEX_FILE))
            .map_err(|e| RetrievalError::Persistence(format!("read index: {e}")))?;

        if index.dimension() != manifest.dimension
            || index.len() != documents.len()
            || documents.len() != manifest.document_count
        {
            return Err(RetrievalError::Persistence(format!(
                "snapshot {} is inconsistent: manifest says {} documents of dimension {}, \
                 found {} documents and {} vectors of dimension {}",
                manifest.id,
                manifest.document_count,
                manifest.dimension,
                documents.len(),
                index.len(),
                index.dimension()
            )));
        }

        let documents = documents
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        debug!("Loaded snapshot {} from {}", manifest.id, dir.display());
        Ok(Some(Self {
            manifest,
            index,
            documents,
        }))
    }
}

impl fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("id", &self.manifest.id)
            .field("fingerprint", &self.manifest.fingerprint.short())
            .field("space", &self.manifest.space)
            .field("documents", &self.documents.len())
            .finish()
    }
}

fn remove_stale_snapshots(root: &Path, keep: &str) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not list {} for cleanup: {e}", root.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(SNAPSHOT_PREFIX) && name != keep {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Could not remove stale snapshot {name}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundqa_embeddings::FlatIndexBackend;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fingerprint(value: &str, item_count: usize) -> Fingerprint {
        Fingerprint {
            value: value.to_string(),
            item_count,
            computed_at: Utc::now(),
        }
    }

    fn snapshot(value: &str) -> IndexSnapshot {
        let entries = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![0.0, 1.0]),
        ];
        let index = FlatIndexBackend.build(2, entries).unwrap();
        let documents = HashMap::from([
            ("a".to_string(), Document::new("a", "A", "alpha")),
            ("b".to_string(), Document::new("b", "B", "beta")),
        ]);
        IndexSnapshot::new(fingerprint(value, 2), "hash:test:2", "flat-cosine", index, documents)
    }

    #[test]
    fn test_persist_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let original = snapshot("fp-1");
        original.persist(temp_dir.path()).unwrap();

        let loaded = IndexSnapshot::load(temp_dir.path(), &FlatIndexBackend)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id(), original.id());
        assert!(loaded.fingerprint().same_content(original.fingerprint()));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.document("b").unwrap().text, "beta");
        assert_eq!(loaded.search(&[0.0, 1.0], 1).unwrap()[0].id, "b");
    }

    #[test]
    fn test_load_without_pointer_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(
            IndexSnapshot::load(temp_dir.path(), &FlatIndexBackend)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_new_snapshot_replaces_old_directory() {
        let temp_dir = TempDir::new().unwrap();
        let first = snapshot("fp-1");
        let first_dir = first.persist(temp_dir.path()).unwrap();
        let second = snapshot("fp-2");
        second.persist(temp_dir.path()).unwrap();

        assert!(!first_dir.exists());
        let loaded = IndexSnapshot::load(temp_dir.path(), &FlatIndexBackend)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.fingerprint().value, "fp-2");
    }

    #[test]
    fn test_inconsistent_snapshot_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = snapshot("fp-1").persist(temp_dir.path()).unwrap();
        fs::write(dir.join(DOCUMENTS_FILE), "[]").unwrap();

        assert!(matches!(
            IndexSnapshot::load(temp_dir.path(), &FlatIndexBackend),
            Err(RetrievalError::Persistence(_))
        ));
    }
}
