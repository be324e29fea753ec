//! Incremental indexing service.
//!
//! The service owns the published [`IndexSnapshot`] of one corpus. Reads
//! clone an `Arc` out of a watch channel and never wait on a build. A
//! rebuild is started only when the corpus fingerprint differs from the one
//! recorded on the published snapshot, and at most one rebuild runs at a
//! time per service.
//!
//! Builds run on their own task. A caller that stops waiting does not abort
//! a build it started, and a failed build leaves the previous snapshot
//! published.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use groundqa_corpus::{
    Document, DocumentStore, Fingerprint, FingerprintTracker, StoreFingerprintTracker,
};
use groundqa_embeddings::{EmbeddingProvider, FlatIndexBackend, VectorIndexBackend};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IndexingConfig;
use crate::error::{Result, RetrievalError};
use crate::snapshot::IndexSnapshot;

/// Outcome of a non-blocking refresh.
#[derive(Debug, Clone)]
pub enum Refresh {
    /// The corpus matches the published snapshot.
    Unchanged(Arc<IndexSnapshot>),
    /// A new snapshot was built and published.
    Rebuilt(Arc<IndexSnapshot>),
    /// Another build holds the token; carries the snapshot published so far.
    InProgress(Option<Arc<IndexSnapshot>>),
}

/// Point-in-time view of the service.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    /// Description of the corpus source.
    pub source: String,

    /// Embedding space queries and builds use.
    pub space: String,

    /// Published snapshot id.
    pub snapshot_id: Option<String>,

    /// Fingerprint recorded on the published snapshot.
    pub fingerprint: Option<Fingerprint>,

    /// Documents in the published snapshot.
    pub document_count: usize,

    /// When the published snapshot was built.
    pub built_at: Option<DateTime<Utc>>,

    /// Whether a build currently holds the token.
    pub building: bool,

    /// Successful rebuilds since start.
    pub rebuilds: u64,

    /// Error of the most recent build, if it failed.
    pub last_error: Option<String>,
}

struct Inner {
    config: IndexingConfig,
    store: Arc<dyn DocumentStore>,
    tracker: Arc<dyn FingerprintTracker>,
    embedder: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn VectorIndexBackend>,
    published: watch::Sender<Option<Arc<IndexSnapshot>>>,
    build_token: Arc<Mutex<()>>,
    /// Finished build attempts, successful or not.
    attempts: AtomicU64,
    rebuilds: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
}

/// Keeps a published index snapshot in step with the corpus.
#[derive(Clone)]
pub struct IndexingService {
    inner: Arc<Inner>,
}

impl IndexingService {
    /// Create a service with the default tracker and the flat index backend.
    pub fn new(
        config: IndexingConfig,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Self::builder(store, embedder).with_config(config).build()
    }

    /// Start building a service over `store`, embedding with `embedder`.
    pub fn builder(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> IndexingServiceBuilder {
        IndexingServiceBuilder::new(store, embedder)
    }

    /// The embedder snapshots are built with. Queries must use the same one.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    /// The published snapshot, if any.
    pub fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.inner.published.borrow().clone()
    }

    /// Watch snapshot swaps.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<IndexSnapshot>>> {
        self.inner.published.subscribe()
    }

    /// Load and publish the last persisted snapshot.
    ///
    /// Persisted data that is unreadable or belongs to another embedding
    /// space is logged and ignored, so the next refresh rebuilds.
    pub async fn load_persisted(&self) -> Result<Option<Arc<IndexSnapshot>>> {
        let Some(dir) = self.inner.config.index_dir.clone() else {
            return Ok(None);
        };
        let backend = self.inner.backend.clone();
        let loaded = tokio::task::spawn_blocking(move || IndexSnapshot::load(&dir, backend.as_ref()))
            .await
            .map_err(|e| RetrievalError::Persistence(format!("load task failed: {e}")))?;

        let snapshot = match loaded {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No persisted snapshot found");
                return Ok(None);
            }
            Err(e) => {
                warn!("Ignoring persisted snapshot: {e}");
                return Ok(None);
            }
        };

        let space = self.inner.embedder.space_id();
        if snapshot.space() != space {
            warn!(
                "Ignoring persisted snapshot {} built in space {}, current space is {space}",
                snapshot.id(),
                snapshot.space()
            );
            return Ok(None);
        }

        let snapshot = Arc::new(snapshot);
        let published = self.inner.published.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(snapshot.clone());
                true
            } else {
                false
            }
        });
        if published {
            info!(
                "Loaded persisted snapshot {} ({} documents)",
                snapshot.id(),
                snapshot.len()
            );
            Ok(Some(snapshot))
        } else {
            Ok(self.current())
        }
    }

    /// Make sure the published snapshot reflects the corpus, rebuilding if
    /// the fingerprint changed.
    ///
    /// Callers arriving while a build is running wait for it and observe its
    /// snapshot instead of building again.
    pub async fn ensure_fresh(&self) -> Result<Arc<IndexSnapshot>> {
        let fingerprint = self.inner.tracker.current().await?;
        if let Some(snapshot) = self.fresh_snapshot(&fingerprint) {
            debug!("Snapshot {} is fresh", snapshot.id());
            return Ok(snapshot);
        }

        let seen = self.inner.attempts.load(Ordering::SeqCst);
        let guard = self.inner.build_token.clone().lock_owned().await;
        if let Some(snapshot) = self.fresh_snapshot(&fingerprint) {
            debug!("Observed snapshot {} built while waiting", snapshot.id());
            return Ok(snapshot);
        }
        if self.inner.attempts.load(Ordering::SeqCst) != seen {
            if let Some(err) = self.last_error() {
                return Err(RetrievalError::RebuildFailed(err));
            }
        }

        self.run_build(guard, fingerprint).await
    }

    /// Like [`ensure_fresh`](Self::ensure_fresh) but never waits for a build
    /// started by someone else.
    pub async fn try_ensure_fresh(&self) -> Result<Refresh> {
        let fingerprint = self.inner.tracker.current().await?;
        if let Some(snapshot) = self.fresh_snapshot(&fingerprint) {
            return Ok(Refresh::Unchanged(snapshot));
        }

        let Ok(guard) = self.inner.build_token.clone().try_lock_owned() else {
            debug!("Rebuild already in progress");
            return Ok(Refresh::InProgress(self.current()));
        };
        if let Some(snapshot) = self.fresh_snapshot(&fingerprint) {
            return Ok(Refresh::Unchanged(snapshot));
        }

        self.run_build(guard, fingerprint)
            .await
            .map(Refresh::Rebuilt)
    }

    /// Current state of the service.
    pub fn status(&self) -> IndexStatus {
        let snapshot = self.current();
        IndexStatus {
            source: self.inner.store.describe(),
            space: self.inner.embedder.space_id(),
            snapshot_id: snapshot.as_ref().map(|s| s.id().to_string()),
            fingerprint: snapshot.as_ref().map(|s| s.fingerprint().clone()),
            document_count: snapshot.as_ref().map_or(0, |s| s.len()),
            built_at: snapshot.as_ref().map(|s| s.built_at()),
            building: self.inner.build_token.try_lock().is_err(),
            rebuilds: self.inner.rebuilds.load(Ordering::SeqCst),
            last_error: self.last_error(),
        }
    }

    /// Periodically refresh in the background until `cancel` fires.
    pub fn spawn_refresh_loop(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Refresh loop started (every {interval:?})");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match service.try_ensure_fresh().await {
                    Ok(Refresh::Rebuilt(snapshot)) => {
                        info!("Refresh published snapshot {}", snapshot.id());
                    }
                    Ok(Refresh::Unchanged(_)) => debug!("Refresh: corpus unchanged"),
                    Ok(Refresh::InProgress(_)) => debug!("Refresh: build already running"),
                    Err(e) => warn!("Background refresh failed: {e}"),
                }
            }
            info!("Refresh loop stopped");
        })
    }

    fn fresh_snapshot(&self, fingerprint: &Fingerprint) -> Option<Arc<IndexSnapshot>> {
        self.current()
            .filter(|snapshot| snapshot.fingerprint().same_content(fingerprint))
    }

    fn last_error(&self) -> Option<String> {
        match self.inner.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn run_build(
        &self,
        guard: OwnedMutexGuard<()>,
        fingerprint: Fingerprint,
    ) -> Result<Arc<IndexSnapshot>> {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let result = inner.build(fingerprint).await;
            inner.record(&result);
            drop(guard);
            result
        });
        handle
            .await
            .map_err(|e| RetrievalError::RebuildFailed(format!("build task aborted: {e}")))?
    }
}

impl Inner {
    async fn build(&self, fingerprint: Fingerprint) -> Result<Arc<IndexSnapshot>> {
        let started = Instant::now();
        info!(
            "Rebuilding index for {} (fingerprint {}, {} documents)",
            self.store.describe(),
            fingerprint.short(),
            fingerprint.item_count
        );

        let batch_size = self.config.batch_size;
        let mut documents: HashMap<String, Document> = HashMap::new();
        let mut vectors = HashMap::new();
        let mut batch = Vec::with_capacity(batch_size);
        let mut batches = 0usize;

        let mut stream = self.store.stream_documents();
        while let Some(doc) = stream.next().await {
            let doc = doc.map_err(|e| RetrievalError::RebuildFailed(format!("reading corpus: {e}")))?;
            batch.push(doc);
            if batch.len() == batch_size {
                self.embed_batch(&mut batch, &mut documents, &mut vectors)
                    .await?;
                batches += 1;
            }
        }
        if !batch.is_empty() {
            self.embed_batch(&mut batch, &mut documents, &mut vectors)
                .await?;
            batches += 1;
        }

        let mut entries: Vec<_> = vectors.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let index = self
            .backend
            .build(self.embedder.dimension(), entries)
            .map_err(|e| RetrievalError::RebuildFailed(format!("building index: {e}")))?;

        let snapshot = IndexSnapshot::new(
            fingerprint,
            self.embedder.space_id(),
            self.backend.name(),
            index,
            documents,
        );

        let snapshot = match self.config.index_dir.clone() {
            Some(dir) => {
                let persisted = tokio::task::spawn_blocking(move || {
                    snapshot.persist(&dir).map(|_| snapshot)
                })
                .await
                .map_err(|e| RetrievalError::RebuildFailed(format!("persist task failed: {e}")))?;
                persisted
                    .map_err(|e| RetrievalError::RebuildFailed(format!("persisting snapshot: {e}")))?
            }
            None => snapshot,
        };

        let snapshot = Arc::new(snapshot);
        self.published.send_replace(Some(snapshot.clone()));
        info!(
            "Published snapshot {} ({} documents, {batches} batches) in {:?}",
            snapshot.id(),
            snapshot.len(),
            started.elapsed()
        );
        Ok(snapshot)
    }

    /// Embed `batch` with a single call and move it into the build maps.
    /// A later occurrence of an id replaces the earlier one.
    async fn embed_batch(
        &self,
        batch: &mut Vec<Document>,
        documents: &mut HashMap<String, Document>,
        vectors: &mut HashMap<String, Vec<f32>>,
    ) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|doc| doc.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| RetrievalError::RebuildFailed(format!("embedding batch: {e}")))?;
        if embeddings.len() != batch.len() {
            return Err(RetrievalError::RebuildFailed(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                batch.len()
            )));
        }

        for (doc, embedding) in batch.drain(..).zip(embeddings) {
            vectors.insert(doc.id.clone(), embedding);
            documents.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    fn record(&self, result: &Result<Arc<IndexSnapshot>>) {
        let mut last_error = match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match result {
            Ok(_) => {
                *last_error = None;
                self.rebuilds.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!("Index rebuild failed, keeping previous snapshot: {e}");
                *last_error = Some(match e {
                    RetrievalError::RebuildFailed(reason) => reason.clone(),
                    other => other.to_string(),
                });
            }
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder for [`IndexingService`].
pub struct IndexingServiceBuilder {
    config: IndexingConfig,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn VectorIndexBackend>,
    tracker: Option<Arc<dyn FingerprintTracker>>,
}

impl IndexingServiceBuilder {
    fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config: IndexingConfig::default(),
            store,
            embedder,
            backend: Arc::new(FlatIndexBackend),
            tracker: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: IndexingConfig) -> Self {
        self.config = config;
        self
    }

    /// Use another vector index backend.
    pub fn with_backend(mut self, backend: Arc<dyn VectorIndexBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Use a custom fingerprint tracker. By default the store is hashed with
    /// the embedding space as salt.
    pub fn with_tracker(mut self, tracker: Arc<dyn FingerprintTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Build the service. Nothing is indexed until the first refresh.
    pub fn build(self) -> Result<IndexingService> {
        self.config.validate()?;
        let tracker: Arc<dyn FingerprintTracker> = match self.tracker {
            Some(tracker) => tracker,
            None => Arc::new(
                StoreFingerprintTracker::new(self.store.clone())
                    .with_salt(self.embedder.space_id()),
            ),
        };
        let (published, _) = watch::channel(None);
        Ok(IndexingService {
            inner: Arc::new(Inner {
                config: self.config,
                store: self.store,
                tracker,
                embedder: self.embedder,
                backend: self.backend,
                published,
                build_token: Arc::new(Mutex::new(())),
                attempts: AtomicU64::new(0),
                rebuilds: AtomicU64::new(0),
                last_error: std::sync::Mutex::new(None),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundqa_corpus::MemoryStore;
    use groundqa_embeddings::HashEmbedder;
    use pretty_assertions::assert_eq;

    fn service(store: Arc<MemoryStore>) -> IndexingService {
        IndexingService::new(
            IndexingConfig::new().with_batch_size(2),
            store,
            Arc::new(HashEmbedder::new(16)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_refresh_builds_all_documents() {
        let store = Arc::new(MemoryStore::with_documents(vec![
            Document::new("1", "One", "first"),
            Document::new("2", "Two", "second"),
            Document::new("3", "Three", "third"),
        ]));
        let service = service(store);
        assert!(service.current().is_none());

        let snapshot = service.ensure_fresh().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.dimension(), 16);
        assert_eq!(service.status().rebuilds, 1);
    }

    #[tokio::test]
    async fn test_unchanged_corpus_reuses_snapshot() {
        let store = Arc::new(MemoryStore::with_documents(vec![Document::new(
            "1", "One", "first",
        )]));
        let service = service(store.clone());

        let first = service.ensure_fresh().await.unwrap();
        let second = service.ensure_fresh().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            service.try_ensure_fresh().await.unwrap(),
            Refresh::Unchanged(_)
        ));

        store.upsert(Document::new("2", "Two", "second"));
        let third = service.ensure_fresh().await.unwrap();
        assert_ne!(third.id(), first.id());
        assert_eq!(third.len(), 2);
        // Readers holding the old snapshot keep a valid index.
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_published_snapshot() {
        let store = Arc::new(MemoryStore::with_documents(vec![Document::new(
            "1", "One", "first",
        )]));
        let service = service(store);
        assert_eq!(service.status().snapshot_id, None);

        let snapshot = service.ensure_fresh().await.unwrap();
        let status = service.status();
        assert_eq!(status.snapshot_id.as_deref(), Some(snapshot.id()));
        assert_eq!(status.document_count, 1);
        assert_eq!(status.space, "hash:sha512-stream:16");
        assert!(!status.building);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_refresh_loop_stops_on_cancel() {
        let store = Arc::new(MemoryStore::with_documents(vec![Document::new(
            "1", "One", "first",
        )]));
        let service = service(store);
        let cancel = CancellationToken::new();

        let mut updates = service.subscribe();
        let handle = service.spawn_refresh_loop(Duration::from_millis(10), cancel.clone());
        updates.wait_for(Option::is_some).await.unwrap();
        assert!(service.current().is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
