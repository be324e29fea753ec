//! Command handler for the grounded QA core.
//!
//! Wires the corpus store, embedder, indexing service, retriever, grounding
//! policy and generator chosen by [`AppConfig`], and shapes their results
//! into the JSON responses the binary prints.

use std::sync::Arc;

use anyhow::{Context, Result};
use groundqa_answer::{
    AnswerGenerator, AnswerOutcome, ExtractiveGenerator, GroundingPolicy, OllamaGenerator,
    QaOrchestrator,
};
use groundqa_corpus::{DocumentStore, FileStore};
use groundqa_embeddings::{EmbeddingProvider, HashEmbedder, OllamaProvider};
use groundqa_retrieval::{Hit, IndexSnapshot, IndexStatus, IndexingService, Retrieve, Retriever};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, EmbeddingBackend, GenerationBackend};

/// Result of an index refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub snapshot_id: String,
    pub fingerprint: String,
    pub space: String,
    pub document_count: usize,
    /// RFC 3339.
    pub built_at: String,
}

/// Ranked hits for a query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<Hit>,
}

/// A cited document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationSummary {
    pub doc_id: String,
    pub title: String,
}

/// Grounded answer to a question.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<CitationSummary>,
    pub retrieved_context: Vec<String>,
    pub outcome: AnswerOutcome,
}

/// Handler for QA commands.
pub struct QaHandler {
    indexing: IndexingService,
    retriever: Arc<Retriever>,
    orchestrator: QaOrchestrator,
}

impl QaHandler {
    /// Create a handler with the backends named in `config`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::new(&config.corpus.path));
        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.backend {
            EmbeddingBackend::Ollama => Arc::new(
                OllamaProvider::new(config.embedding.ollama(), config.embedding.dimension)
                    .context("Failed to create Ollama embedding provider")?,
            ),
            EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embedding.dimension)),
        };
        let generator: Arc<dyn AnswerGenerator> = match config.generation.backend {
            GenerationBackend::Ollama => Arc::new(
                OllamaGenerator::new(config.generation.ollama())
                    .context("Failed to create Ollama generator")?,
            ),
            GenerationBackend::Extractive => {
                Arc::new(ExtractiveGenerator::new(config.generation.max_sentences))
            }
        };
        Self::with_capabilities(config, store, embedder, generator)
    }

    /// Create a handler over explicit capabilities. Only the tuning sections
    /// of `config` are used.
    pub fn with_capabilities(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self> {
        let indexing = IndexingService::new(config.index.clone(), store, embedder)
            .context("Invalid [index] section")?;
        let retriever = Arc::new(
            Retriever::new(indexing.clone(), config.retrieval.clone())
                .context("Invalid [retrieval] section")?,
        );
        let policy =
            GroundingPolicy::new(config.grounding.clone()).context("Invalid [grounding] section")?;
        let orchestrator = QaOrchestrator::new(
            retriever.clone() as Arc<dyn Retrieve>,
            policy,
            generator,
            config.qa.clone(),
        )
        .context("Invalid [qa] section")?;

        Ok(Self {
            indexing,
            retriever,
            orchestrator,
        })
    }

    /// The indexing service behind this handler.
    pub fn indexing(&self) -> &IndexingService {
        &self.indexing
    }

    /// Publish the last persisted snapshot, if there is a usable one.
    pub async fn warm_up(&self) -> Result<()> {
        if let Some(snapshot) = self.indexing.load_persisted().await? {
            info!(
                "Serving persisted snapshot {} ({} documents)",
                snapshot.id(),
                snapshot.len()
            );
        }
        Ok(())
    }

    /// Bring the index up to date with the corpus.
    pub async fn index(&self) -> Result<IndexResponse> {
        let snapshot = self
            .indexing
            .ensure_fresh()
            .await
            .context("Failed to refresh the index")?;
        Ok(index_response(&snapshot))
    }

    /// Refresh before serving a query. A failed refresh is only fatal when
    /// there is no published snapshot to fall back on.
    async fn refresh_for_query(&self) -> Result<()> {
        match self.indexing.ensure_fresh().await {
            Ok(_) => Ok(()),
            Err(e) => match self.indexing.current() {
                Some(snapshot) => {
                    warn!(
                        "Index refresh failed, serving snapshot {}: {e}",
                        snapshot.id()
                    );
                    Ok(())
                }
                None => Err(e).context("Failed to refresh the index"),
            },
        }
    }

    /// Retrieve up to `k` hits (the configured `top_k` when `None`).
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<SearchResponse> {
        self.refresh_for_query().await?;
        let k = k.unwrap_or(self.orchestrator.config().top_k);
        let hits = self.retriever.retrieve(query, k).await?;
        Ok(SearchResponse {
            query: query.trim().to_string(),
            hits,
        })
    }

    /// Answer `query` from the corpus.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<AskResponse> {
        self.refresh_for_query().await?;
        let k = k.unwrap_or(self.orchestrator.config().top_k);
        let answer = self.orchestrator.answer_with_k(query, k).await?;

        Ok(AskResponse {
            answer: answer.text,
            citations: answer
                .citations
                .iter()
                .map(|hit| CitationSummary {
                    doc_id: hit.doc_id.clone(),
                    title: hit.title.clone(),
                })
                .collect(),
            retrieved_context: answer.contexts,
            outcome: answer.outcome,
        })
    }

    /// Current index state, without refreshing.
    pub fn status(&self) -> IndexStatus {
        self.indexing.status()
    }
}

fn index_response(snapshot: &IndexSnapshot) -> IndexResponse {
    IndexResponse {
        snapshot_id: snapshot.id().to_string(),
        fingerprint: snapshot.fingerprint().value.clone(),
        space: snapshot.space().to_string(),
        document_count: snapshot.len(),
        built_at: snapshot.built_at().to_rfc3339(),
    }
}
