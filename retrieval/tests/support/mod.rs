//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use groundqa_corpus::{Document, MemoryStore};
use groundqa_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, HashEmbedder};
use tokio::sync::watch;

/// Hash embedder that counts calls, can be made to fail and can hold
/// batch calls at a gate until released. Query embeddings (`embed`) are
/// never held.
pub struct TestEmbedder {
    inner: HashEmbedder,
    batches: AtomicUsize,
    texts: AtomicUsize,
    queries: AtomicUsize,
    failing: AtomicBool,
    gate: watch::Sender<bool>,
}

impl TestEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            inner: HashEmbedder::new(dimension),
            batches: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            gate,
        })
    }

    /// An embedder whose calls block until [`open`](Self::open).
    pub fn gated(dimension: usize) -> Arc<Self> {
        let embedder = Self::new(dimension);
        embedder.gate.send_replace(false);
        embedder
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Hold batch calls starting from now.
    pub fn close(&self) {
        self.gate.send_replace(false);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed_batch` calls that started.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of texts embedded.
    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    /// Number of single-text query embeddings.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` batch calls have started.
    pub async fn wait_for_batches(&self, n: usize) {
        while self.batches() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TestEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> groundqa_embeddings::Result<Vec<Embedding>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("test embedder is down".to_string()));
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    async fn embed(&self, text: &str) -> groundqa_embeddings::Result<Embedding> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("test embedder is down".to_string()));
        }
        self.inner.embed(text).await
    }
}

pub fn papers() -> Vec<Document> {
    vec![
        Document::new(
            "p1",
            "Sparse attention",
            "Sparse attention patterns let transformers scale to long documents.",
        ),
        Document::new(
            "p2",
            "Graph neural networks",
            "Message passing networks predict molecular properties from graphs.",
        ),
        Document::new(
            "p3",
            "Retrieval augmented generation",
            "Retrieval grounds language model answers in external documents.",
        ),
    ]
}

pub fn paper_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_documents(papers()))
}
