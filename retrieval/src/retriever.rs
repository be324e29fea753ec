//! Query-time retrieval against the published snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RerankMode, RetrieverConfig};
use crate::error::{Result, RetrievalError};
use crate::indexing::IndexingService;
use crate::text::{coverage, term_set};

/// A retrieved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Document id.
    pub doc_id: String,

    /// Document title.
    pub title: String,

    /// Ranking score. Equals `similarity` unless a reranker rescored it.
    pub score: f32,

    /// Cosine similarity between query and document.
    pub similarity: f32,

    /// Text handed to generation as evidence.
    pub snippet: String,
}

/// Anything that can answer `retrieve(query, k)`.
#[async_trait]
pub trait Retrieve: Send + Sync {
    /// Up to `k` hits ordered by descending score, ties by ascending id.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>>;
}

/// Second-stage scorer.
///
/// A reranker only assigns scores; the retriever reorders the candidates it
/// already has, so reranking can never introduce a document.
pub trait Reranker: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// One score per candidate, in candidate order.
    fn score(&self, query: &str, candidates: &[Hit]) -> Vec<f32>;
}

/// Blends cosine similarity with the share of query terms found in the
/// candidate's title and snippet.
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    weight: f32,
}

impl LexicalReranker {
    /// `weight` is the share of term overlap in the final score.
    pub fn new(weight: f32) -> Self {
        Self {
            weight: weight.clamp(0.0, 1.0),
        }
    }
}

impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, query: &str, candidates: &[Hit]) -> Vec<f32> {
        let query_terms = term_set(query);
        candidates
            .iter()
            .map(|hit| {
                let terms = term_set(&format!("{} {}", hit.title, hit.snippet));
                (1.0 - self.weight) * hit.similarity + self.weight * coverage(&query_terms, &terms)
            })
            .collect()
    }
}

/// Retrieves hits from whatever snapshot the indexing service has published.
pub struct Retriever {
    indexing: IndexingService,
    config: RetrieverConfig,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    /// Create a retriever. The query embedder is the one the service builds
    /// snapshots with.
    pub fn new(indexing: IndexingService, config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        let reranker: Option<Arc<dyn Reranker>> = match config.rerank {
            RerankMode::None => None,
            RerankMode::Lexical => Some(Arc::new(LexicalReranker::new(config.lexical_weight))),
        };
        Ok(Self {
            indexing,
            config,
            reranker,
        })
    }

    /// Replace the reranking stage.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    fn floor(&self, scores: &[f32]) -> f32 {
        if !self.config.adaptive_cutoff || scores.is_empty() {
            return self.config.min_similarity;
        }
        adaptive_floor(self.config.min_similarity, scores)
    }
}

/// `max(min, 0.35 × top, 0.5 × median)` over scores sorted descending.
fn adaptive_floor(min_similarity: f32, scores: &[f32]) -> f32 {
    let top = scores[0];
    let mid = scores.len() / 2;
    let median = if scores.len() % 2 == 1 {
        scores[mid]
    } else {
        (scores[mid - 1] + scores[mid]) / 2.0
    };
    min_similarity.max(0.35 * top).max(0.5 * median)
}

fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}

#[async_trait]
impl Retrieve for Retriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".to_string()));
        }
        let k = k.clamp(1, self.config.max_k);

        let snapshot = self.indexing.current().ok_or(RetrievalError::NotReady)?;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.indexing.embedder();
        let space = embedder.space_id();
        if snapshot.space() != space {
            return Err(RetrievalError::SpaceMismatch {
                index: snapshot.space().to_string(),
                query: space,
            });
        }
        let vector = embedder.embed(query).await?;

        let fetch = match self.reranker {
            Some(_) => k.saturating_mul(self.config.candidate_multiplier),
            None => k,
        };
        let scored = snapshot.search(&vector, fetch)?;
        let top_scores: Vec<f32> = scored.iter().take(k).map(|s| s.score).collect();
        let floor = self.floor(&top_scores);

        let mut hits: Vec<Hit> = scored
            .into_iter()
            .filter(|s| s.score >= floor)
            .filter_map(|s| match snapshot.document(&s.id) {
                Some(doc) => Some(Hit {
                    doc_id: doc.id.clone(),
                    title: doc.title.clone(),
                    score: s.score,
                    similarity: s.score,
                    snippet: doc.text.clone(),
                }),
                None => {
                    warn!("Snapshot {} has a vector for unknown id {}", snapshot.id(), s.id);
                    None
                }
            })
            .collect();

        if let Some(reranker) = &self.reranker {
            let scores = reranker.score(query, &hits);
            if scores.len() == hits.len() {
                for (hit, score) in hits.iter_mut().zip(scores) {
                    hit.score = score;
                }
            } else {
                warn!(
                    "Reranker {} returned {} scores for {} candidates; keeping cosine order",
                    reranker.name(),
                    scores.len(),
                    hits.len()
                );
            }
        }
        sort_hits(&mut hits);
        hits.truncate(k);

        debug!(
            "Retrieved {} hits (k={k}, floor={floor:.3}, top={:?})",
            hits.len(),
            hits.first().map(|h| h.score)
        );
        Ok(hits)
    }
}
