//! Document stores.
//!
//! A [`DocumentStore`] hands out lazy document streams. Every call to
//! [`DocumentStore::stream_documents`] starts a fresh pass over the source.
//! When the same id occurs more than once, the later occurrence is the
//! current content for that id.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{CorpusError, Result};

/// A lazy, finite stream of documents.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Storage backend the corpus is read from.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable description of the source, used in logs and status.
    fn describe(&self) -> String;

    /// Start a new pass over all documents.
    ///
    /// If the source cannot be opened the first item is
    /// [`CorpusError::SourceUnavailable`].
    fn stream_documents(&self) -> DocumentStream;

    /// Fetch the current content of one document.
    async fn get(&self, id: &str) -> Result<Document> {
        let mut documents = self.stream_documents();
        let mut found = None;
        while let Some(doc) = documents.next().await {
            let doc = doc?;
            if doc.id == id {
                found = Some(doc);
            }
        }
        found.ok_or_else(|| CorpusError::NotFound(id.to_string()))
    }
}

/// File-backed store reading `.jsonl` (one record per line) or `.json`
/// (array of records).
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store over `path`. The file is not touched until read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the source file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_jsonl(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"))
}

fn file_stream(path: PathBuf) -> impl Stream<Item = Result<Document>> + Send + 'static {
    try_stream! {
        let file = File::open(&path).await.map_err(|e| {
            CorpusError::SourceUnavailable(format!("{}: {e}", path.display()))
        })?;

        let mut skipped = 0usize;
        if is_jsonl(&path) {
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;
            while let Some(line) = lines.next_line().await? {
                line_no += 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(line) {
                    Ok(record) => match Document::from_record(&record) {
                        Some(doc) => {
                            yield doc;
                        }
                        None => skipped += 1,
                    },
                    Err(e) => {
                        warn!("Skipping malformed line {line_no} in {}: {e}", path.display());
                        skipped += 1;
                    }
                }
            }
        } else {
            let mut content = String::new();
            let mut file = file;
            file.read_to_string(&mut content).await?;
            let records = serde_json::from_str::<Vec<serde_json::Value>>(&content)
                .map_err(|e| CorpusError::Malformed(format!("{}: {e}", path.display())))?;
            for record in records {
                match Document::from_record(&record) {
                    Some(doc) => {
                        yield doc;
                    }
                    None => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            debug!("Skipped {skipped} incomplete records in {}", path.display());
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn stream_documents(&self) -> DocumentStream {
        file_stream(self.path.clone()).boxed()
    }
}

/// In-memory store, mainly for embedding the core in tests and tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<Vec<Document>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `documents`.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        for doc in documents {
            store.upsert(doc);
        }
        store
    }

    /// Insert a document, replacing the content of an existing id.
    pub fn upsert(&self, doc: Document) {
        let mut documents = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => documents.push(doc),
        }
    }

    /// Remove a document by id. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut documents = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = documents.len();
        documents.retain(|d| d.id != id);
        documents.len() != before
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Document> {
        match self.documents.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn stream_documents(&self) -> DocumentStream {
        stream::iter(self.snapshot().into_iter().map(Ok)).boxed()
    }

    async fn get(&self, id: &str) -> Result<Document> {
        self.snapshot()
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| CorpusError::NotFound(id.to_string()))
    }
}
