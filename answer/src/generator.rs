//! Generation capability and the offline extractive generator.

use std::collections::HashMap;

use async_trait::async_trait;
use groundqa_retrieval::Hit;
use groundqa_retrieval::text::tokens;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_FALLBACK_MESSAGE;
use crate::error::Result;

/// One piece of evidence handed to a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Id the generator should cite.
    pub doc_id: String,

    /// Document title.
    pub title: String,

    /// Evidence text.
    pub text: String,
}

impl From<&Hit> for ContextSnippet {
    fn from(hit: &Hit) -> Self {
        Self {
            doc_id: hit.doc_id.clone(),
            title: hit.title.clone(),
            text: hit.snippet.clone(),
        }
    }
}

/// Raw generator output. Citations are whatever the generator declared and
/// have not been validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Answer text.
    pub text: String,

    /// Document ids the generator claims to rely on.
    pub citations: Vec<String>,

    /// Self-reported confidence, if the generator gives one.
    pub confidence: Option<f32>,
}

/// Produces an answer from a query and selected evidence.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generator name for logs.
    fn name(&self) -> &str;

    /// Generate an answer using only `contexts`.
    async fn generate(&self, query: &str, contexts: &[ContextSnippet]) -> Result<Generation>;
}

/// Offline generator that answers with the context sentences sharing the
/// most words with the query.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    /// Create a generator quoting at most `max_sentences` sentences.
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Split after `.`, `!` or `?` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            let end = i + c.len_utf8();
            out.push(text[start..end].trim());
            start = end;
        }
    }
    out.push(text[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

fn counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, query: &str, contexts: &[ContextSnippet]) -> Result<Generation> {
        let query_counts = counts(query);
        let mut candidates: Vec<(usize, &str, &str)> = Vec::new();
        for snippet in contexts {
            for sentence in sentences(&snippet.text) {
                let overlap: usize = counts(sentence)
                    .iter()
                    .filter_map(|(word, n)| query_counts.get(word).map(|q| (*n).min(*q)))
                    .sum();
                candidates.push((overlap, sentence, snippet.doc_id.as_str()));
            }
        }
        // Stable sort keeps context order among equal overlaps.
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.truncate(self.max_sentences);

        if candidates.is_empty() {
            return Ok(Generation {
                text: DEFAULT_FALLBACK_MESSAGE.to_string(),
                ..Generation::default()
            });
        }

        let mut citations: Vec<String> = Vec::new();
        for (_, _, doc_id) in &candidates {
            if !citations.iter().any(|c| c == doc_id) {
                citations.push((*doc_id).to_string());
            }
        }
        let text = candidates
            .iter()
            .map(|(_, sentence, _)| *sentence)
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Generation {
            text,
            citations,
            confidence: None,
        })
    }
}
