//! Grounded question answering.
//!
//! Each request walks a fixed sequence of stages:
//!
//! ```text
//! New ─► Retrieved ─► ContextSelected ─► Generated ─► Validated ─► Answered
//!                          │                              │
//!                          └── empty ──► Fallback ◄── ungrounded
//! ```
//!
//! Requests share no mutable state, so one orchestrator serves any number of
//! concurrent queries.

use std::fmt;
use std::sync::Arc;

use groundqa_retrieval::{Hit, Retrieve};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{QaConfig, UngroundedPolicy};
use crate::error::{AnswerError, Result};
use crate::generator::{AnswerGenerator, ContextSnippet};
use crate::grounding::{GroundingPolicy, SelectedContext};

/// Stage of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaStage {
    /// Query accepted, nothing retrieved yet.
    New,
    /// Hits came back from the retriever.
    Retrieved,
    /// The grounding policy picked the context snippets.
    ContextSelected,
    /// The generator produced a draft answer.
    Generated,
    /// Every citation in the draft points into the selected context.
    Validated,
    /// A grounded answer was returned.
    Answered,
    /// The fallback message or an ungrounded answer was returned.
    Fallback,
}

impl fmt::Display for QaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Retrieved => "retrieved",
            Self::ContextSelected => "context_selected",
            Self::Generated => "generated",
            Self::Validated => "validated",
            Self::Answered => "answered",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated and every citation is grounded.
    Answered,
    /// No usable evidence; generation was not called.
    InsufficientEvidence,
    /// The generation cited documents outside the evidence.
    Ungrounded,
}

/// Final answer to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text.
    pub text: String,

    /// Cited hits; always a subset of the selected context.
    pub citations: Vec<Hit>,

    /// Evidence snippets the answer was generated from.
    pub contexts: Vec<String>,

    /// How the answer came about.
    pub outcome: AnswerOutcome,
}

impl Answer {
    /// Whether this is a fallback rather than a grounded answer.
    pub fn is_fallback(&self) -> bool {
        self.outcome != AnswerOutcome::Answered
    }
}

/// Turns a query into a grounded, citation-checked answer.
pub struct QaOrchestrator {
    retriever: Arc<dyn Retrieve>,
    policy: GroundingPolicy,
    generator: Arc<dyn AnswerGenerator>,
    config: QaConfig,
}

fn advance(stage: &mut QaStage, next: QaStage) {
    debug!("QA stage {stage} -> {next}");
    *stage = next;
}

impl QaOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        retriever: Arc<dyn Retrieve>,
        policy: GroundingPolicy,
        generator: Arc<dyn AnswerGenerator>,
        config: QaConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retriever,
            policy,
            generator,
            config,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    /// Answer `query` using the configured number of hits.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        self.answer_with_k(query, self.config.top_k).await
    }

    /// Answer `query`, retrieving up to `k` hits.
    pub async fn answer_with_k(&self, query: &str, k: usize) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AnswerError::InvalidQuery("query is empty".to_string()));
        }
        let mut stage = QaStage::New;

        let hits = self.retriever.retrieve(query, k).await?;
        advance(&mut stage, QaStage::Retrieved);

        let context = self.policy.select(&hits);
        advance(&mut stage, QaStage::ContextSelected);
        if context.is_empty() {
            advance(&mut stage, QaStage::Fallback);
            info!("Insufficient evidence for query ({} hits retrieved)", hits.len());
            return Ok(self.fallback(AnswerOutcome::InsufficientEvidence));
        }

        let snippets: Vec<ContextSnippet> = context.hits.iter().map(ContextSnippet::from).collect();
        let generation = self.generator.generate(query, &snippets).await?;
        advance(&mut stage, QaStage::Generated);

        if generation.text.trim().is_empty() {
            advance(&mut stage, QaStage::Fallback);
            warn!("Generator {} returned an empty answer", self.generator.name());
            return Ok(self.fallback(AnswerOutcome::Ungrounded));
        }

        if GroundingPolicy::validate_citations(&generation.citations, &context) {
            advance(&mut stage, QaStage::Validated);
            let citations = if generation.citations.is_empty() {
                context.hits.clone()
            } else {
                GroundingPolicy::restrict_citations(&generation.citations, &context)
            };
            advance(&mut stage, QaStage::Answered);
            return Ok(Answer {
                text: generation.text.trim().to_string(),
                citations,
                contexts: context.snippets(),
                outcome: AnswerOutcome::Answered,
            });
        }

        let unknown: Vec<&str> = generation
            .citations
            .iter()
            .map(String::as_str)
            .filter(|id| !context.contains(id))
            .collect();
        warn!(
            "Generator {} cited documents outside the context: {unknown:?}",
            self.generator.name()
        );
        advance(&mut stage, QaStage::Fallback);
        Ok(self.ungrounded(&generation.text, &generation.citations, &context))
    }

    fn fallback(&self, outcome: AnswerOutcome) -> Answer {
        Answer {
            text: self.config.fallback_message.clone(),
            citations: Vec::new(),
            contexts: Vec::new(),
            outcome,
        }
    }

    fn ungrounded(&self, text: &str, citations: &[String], context: &SelectedContext) -> Answer {
        match self.config.ungrounded {
            UngroundedPolicy::FallbackMessage => self.fallback(AnswerOutcome::Ungrounded),
            UngroundedPolicy::RestrictCitations => {
                let citations = GroundingPolicy::restrict_citations(citations, context);
                if citations.is_empty() {
                    return self.fallback(AnswerOutcome::Ungrounded);
                }
                Answer {
                    text: text.trim().to_string(),
                    citations,
                    contexts: context.snippets(),
                    outcome: AnswerOutcome::Ungrounded,
                }
            }
        }
    }
}
