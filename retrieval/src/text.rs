//! Word tokenisation shared by lexical scoring.

use std::collections::HashSet;

/// Lowercased alphanumeric words of `text`, in order.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct words of `text`.
pub fn term_set(text: &str) -> HashSet<String> {
    tokens(text).into_iter().collect()
}

/// Fraction of `query` terms that also occur in `terms`.
pub fn coverage(query: &HashSet<String>, terms: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(terms).count() as f32 / query.len() as f32
}
