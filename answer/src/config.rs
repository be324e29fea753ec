//! Configuration for grounding and answer orchestration.

use serde::{Deserialize, Serialize};

use crate::error::{AnswerError, Result};

/// Answer used whenever no grounded answer can be given.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "I don't know based on the provided context.";

/// How context size is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    /// UTF-8 bytes.
    Bytes,
    /// Whitespace-separated tokens.
    Tokens,
}

impl BudgetUnit {
    /// Size of `text` in this unit.
    pub fn measure(self, text: &str) -> usize {
        match self {
            Self::Bytes => text.len(),
            Self::Tokens => text.split_whitespace().count(),
        }
    }
}

/// Configuration for evidence selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Hits below this cosine similarity are never used as evidence.
    pub min_similarity: f32,

    /// Maximum total size of selected snippets.
    ///
    /// Selection stops at the first snippet that would overflow it, so a top
    /// snippet larger than the whole budget leaves the context empty and the
    /// query falls back with insufficient evidence.
    pub budget: usize,

    /// Unit of `budget`.
    pub unit: BudgetUnit,

    /// Maximum number of selected hits.
    pub max_hits: usize,

    /// Token-set Jaccard similarity at which two snippets count as
    /// near-duplicates.
    pub duplicate_threshold: f32,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.05,
            budget: 6000,
            unit: BudgetUnit::Bytes,
            max_hits: 5,
            duplicate_threshold: 0.9,
        }
    }
}

impl GroundingConfig {
    /// Set the size budget.
    pub fn with_budget(mut self, budget: usize, unit: BudgetUnit) -> Self {
        self.budget = budget;
        self.unit = unit;
        self
    }

    /// Set the maximum number of hits.
    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }

    /// Set the similarity floor.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Check the configuration for values the policy cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.budget == 0 {
            return Err(AnswerError::Config("budget must be positive".to_string()));
        }
        if self.max_hits == 0 {
            return Err(AnswerError::Config("max_hits must be at least 1".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(AnswerError::Config(format!(
                "min_similarity must be within [-1, 1], got {}",
                self.min_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.duplicate_threshold) || self.duplicate_threshold == 0.0 {
            return Err(AnswerError::Config(format!(
                "duplicate_threshold must be within (0, 1], got {}",
                self.duplicate_threshold
            )));
        }
        Ok(())
    }
}

/// What to do with a generation that cites documents outside the selected
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngroundedPolicy {
    /// Replace the answer with the fallback message and cite nothing.
    #[default]
    FallbackMessage,
    /// Keep the text but drop every citation outside the selected context.
    RestrictCitations,
}

/// Configuration for the QA orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Hits requested from the retriever.
    pub top_k: usize,

    /// Handling of ungrounded generations.
    pub ungrounded: UngroundedPolicy,

    /// Text of fallback answers.
    pub fallback_message: String,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            ungrounded: UngroundedPolicy::default(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl QaConfig {
    /// Set the number of hits requested per query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the ungrounded-answer policy.
    pub fn with_ungrounded(mut self, policy: UngroundedPolicy) -> Self {
        self.ungrounded = policy;
        self
    }

    /// Check the configuration for values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(AnswerError::Config("top_k must be at least 1".to_string()));
        }
        if self.fallback_message.trim().is_empty() {
            return Err(AnswerError::Config(
                "fallback_message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_units() {
        assert_eq!(BudgetUnit::Bytes.measure("héllo world"), 12);
        assert_eq!(BudgetUnit::Tokens.measure("  héllo   world \n"), 2);
    }

    #[test]
    fn test_validation() {
        assert!(GroundingConfig::default().validate().is_ok());
        assert!(QaConfig::default().validate().is_ok());
        assert!(
            GroundingConfig::default()
                .with_budget(0, BudgetUnit::Tokens)
                .validate()
                .is_err()
        );
        assert!(QaConfig::default().with_top_k(0).validate().is_err());
    }
}
