//! Ollama generation backend (`POST /api/generate`).

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use groundqa_embeddings::OllamaConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnswerError, Result};
use crate::generator::{AnswerGenerator, ContextSnippet, Generation};

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2:3b";

const SYSTEM_PROMPT: &str = "\
You are a grounded question answering assistant. Answer the user's question \
using only the numbered context documents below. Each document starts with its \
id in square brackets.

Respond with a single JSON object and nothing else:
{\"answer\": string, \"citations\": [document ids you used], \"confidence\": number between 0 and 1}

Rules:
- Use only facts stated in the context.
- Cite only ids that appear in the context.
- If the context does not answer the question, set \"answer\" to \
\"I don't know based on the provided context.\" and \"citations\" to [].";

static CITATION_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\s]+)\]").ok());

/// Generator backed by an Ollama server.
pub struct OllamaGenerator {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaGenerator {
    /// Create a generator. The server is not contacted until the first call.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(
            "Ollama generator at {} (model {})",
            config.host, config.model
        );
        Ok(Self { config, client })
    }

    fn prompt(query: &str, contexts: &[ContextSnippet]) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        prompt.push_str("\n\n[CONTEXT]\n");
        for snippet in contexts {
            prompt.push_str(&format!(
                "[{}] {}\n{}\n\n",
                snippet.doc_id, snippet.title, snippet.text
            ));
        }
        prompt.push_str("[QUESTION]\n");
        prompt.push_str(query);
        prompt.push('\n');
        prompt
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(self.config.endpoint("api/generate"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AnswerError::CapabilityUnavailable(format!(
                "model {} is not available on {}",
                self.config.model, self.config.host
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnswerError::CapabilityUnavailable(format!(
                "ollama returned {status}: {error_text}"
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }
}

/// Interpret raw model output.
///
/// Well-formed JSON gives text, citations and confidence directly. Anything
/// else is kept as plain text with citations taken from `[id]` markers.
fn parse_output(raw: &str) -> Generation {
    if let Ok(output) = serde_json::from_str::<ModelOutput>(raw.trim()) {
        return Generation {
            text: output.answer.trim().to_string(),
            citations: output.citations,
            confidence: output.confidence,
        };
    }

    let mut citations: Vec<String> = Vec::new();
    if let Some(marker) = CITATION_MARKER.as_ref() {
        for captures in marker.captures_iter(raw) {
            if let Some(id) = captures.get(1) {
                let id = id.as_str().to_string();
                if !citations.contains(&id) {
                    citations.push(id);
                }
            }
        }
    }
    Generation {
        text: raw.trim().to_string(),
        citations,
        confidence: None,
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, query: &str, contexts: &[ContextSnippet]) -> Result<Generation> {
        let prompt = Self::prompt(query, contexts);
        debug!(
            "Generating with {} over {} context snippets",
            self.config.model,
            contexts.len()
        );

        let attempts = self.config.attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.request(&prompt).await {
                Ok(raw) => return Ok(parse_output(&raw)),
                Err(e) => {
                    warn!("Ollama generate attempt {attempt}/{attempts} failed: {e}");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        Err(AnswerError::CapabilityUnavailable(match last_error {
            Some(e) => e.to_string(),
            None => "no attempt made".to_string(),
        }))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    answer: String,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}
