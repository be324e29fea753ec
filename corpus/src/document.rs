//! Corpus documents and record mapping.

use serde::{Deserialize, Serialize};

/// Keys tried, in order, for the document id.
const ID_KEYS: &[&str] = &["id", "doc_id", "paperId", "uid", "uuid"];

/// Keys tried, in order, for the title.
const TITLE_KEYS: &[&str] = &["title", "paper_title", "name"];

/// Keys tried, in order, for the body text.
const TEXT_KEYS: &[&str] = &[
    "abstract",
    "summary",
    "abstract_text",
    "text",
    "description",
    "body",
];

/// One corpus item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique, stable identifier.
    pub id: String,

    /// Document title.
    pub title: String,

    /// Abstract or body text; this is what gets embedded and quoted.
    pub text: String,
}

impl Document {
    /// Create a document.
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Map a loosely-shaped JSON record to a document.
    ///
    /// Returns `None` unless an id, a title and a body are all present and
    /// non-blank. Values are trimmed.
    pub fn from_record(record: &serde_json::Value) -> Option<Self> {
        let object = record.as_object()?;
        let pick = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| object.get(*k).and_then(serde_json::Value::as_str))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            id: pick(ID_KEYS)?,
            title: pick(TITLE_KEYS)?,
            text: pick(TEXT_KEYS)?,
        })
    }
}
