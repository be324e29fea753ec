//! Evidence selection and citation validation.
//!
//! Both operations are pure: the same hits and configuration always give the
//! same context, and validation only compares ids.

use std::collections::HashSet;

use groundqa_retrieval::Hit;
use groundqa_retrieval::text::term_set;
use serde::Serialize;
use tracing::debug;

use crate::config::{BudgetUnit, GroundingConfig};
use crate::error::Result;

/// Evidence chosen for one query, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedContext {
    /// Selected hits, highest score first.
    pub hits: Vec<Hit>,

    /// Total size of the selected snippets.
    pub size: usize,

    /// Unit `size` is measured in.
    pub unit: BudgetUnit,
}

impl SelectedContext {
    fn empty(unit: BudgetUnit) -> Self {
        Self {
            hits: Vec::new(),
            size: 0,
            unit,
        }
    }

    /// Whether no evidence was selected.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Whether `doc_id` is part of the context.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.hits.iter().any(|hit| hit.doc_id == doc_id)
    }

    /// Ids of the selected documents.
    pub fn ids(&self) -> HashSet<&str> {
        self.hits.iter().map(|hit| hit.doc_id.as_str()).collect()
    }

    /// Snippets in selection order.
    pub fn snippets(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.snippet.clone()).collect()
    }
}

/// Chooses evidence within a budget and checks that answers cite only it.
#[derive(Debug, Clone)]
pub struct GroundingPolicy {
    config: GroundingConfig,
}

impl GroundingPolicy {
    /// Create a policy.
    pub fn new(config: GroundingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Select evidence from `hits`.
    ///
    /// Hits are taken by descending score (ties by id). A hit is skipped when
    /// it duplicates an already selected document or its snippet is a
    /// near-duplicate of one. Selection stops at the first hit that would
    /// exceed the budget or once `max_hits` are selected. Without any hit at
    /// or above the similarity floor the context is empty.
    pub fn select(&self, hits: &[Hit]) -> SelectedContext {
        let unit = self.config.unit;
        let mut candidates: Vec<&Hit> = hits
            .iter()
            .filter(|hit| hit.similarity >= self.config.min_similarity)
            .collect();
        if candidates.is_empty() {
            debug!("No hit reaches similarity {}", self.config.min_similarity);
            return SelectedContext::empty(unit);
        }
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        let mut context = SelectedContext::empty(unit);
        let mut selected_terms = Vec::new();
        let mut duplicates = 0usize;
        for hit in candidates {
            if context.hits.len() >= self.config.max_hits {
                break;
            }
            let terms = term_set(&hit.snippet);
            if context.contains(&hit.doc_id)
                || selected_terms
                    .iter()
                    .any(|seen| jaccard(seen, &terms) >= self.config.duplicate_threshold)
            {
                duplicates += 1;
                continue;
            }
            let size = unit.measure(&hit.snippet);
            if context.size + size > self.config.budget {
                if context.is_empty() {
                    debug!(
                        "Top snippet of {} is {size} {unit:?}, over the budget of {}; no context selected",
                        hit.doc_id, self.config.budget
                    );
                } else {
                    debug!(
                        "Budget reached at {} of {} {unit:?}",
                        context.size, self.config.budget
                    );
                }
                break;
            }
            context.size += size;
            context.hits.push(hit.clone());
            selected_terms.push(terms);
        }

        debug!(
            "Selected {} hits ({} {unit:?}), skipped {duplicates} near-duplicates",
            context.hits.len(),
            context.size
        );
        context
    }

    /// Whether every declared citation names a document of `context`.
    pub fn validate_citations(citations: &[String], context: &SelectedContext) -> bool {
        let ids = context.ids();
        citations.iter().all(|id| ids.contains(id.as_str()))
    }

    /// Hits of `context` that `citations` name, in context order.
    pub fn restrict_citations(citations: &[String], context: &SelectedContext) -> Vec<Hit> {
        let cited: HashSet<&str> = citations.iter().map(String::as_str).collect();
        context
            .hits
            .iter()
            .filter(|hit| cited.contains(hit.doc_id.as_str()))
            .cloned()
            .collect()
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
