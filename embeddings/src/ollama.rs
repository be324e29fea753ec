//! Ollama embedding provider (`POST /api/embed`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, check_dimension};
use crate::similarity::normalize;

/// Default Ollama endpoint when `OLLAMA_HOST` is unset.
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Connection settings shared by Ollama-backed capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL, e.g. `http://127.0.0.1:11434`.
    pub host: String,

    /// Model tag.
    pub model: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts per call (1 = no retry).
    pub attempts: u32,

    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl OllamaConfig {
    /// Create a config for `model`, resolving the host from `OLLAMA_HOST`.
    pub fn new(model: impl Into<String>) -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        Self {
            host,
            model: model.into(),
            timeout_secs: 120,
            attempts: 2,
            retry_delay_ms: 800,
        }
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the number of attempts per call.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Full URL for an API path such as `api/embed`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.host.trim_end_matches('/'))
    }
}

/// Embedding provider backed by a local or remote Ollama server.
pub struct OllamaProvider {
    config: OllamaConfig,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider. Untagged model names get the `:latest` tag.
    pub fn new(mut config: OllamaConfig, dimension: usize) -> Result<Self> {
        if !config.model.contains(':') {
            config.model.push_str(":latest");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(
            "Ollama embedding provider at {} (model {}, dim {dimension})",
            config.host, config.model
        );
        Ok(Self {
            config,
            dimension,
            client,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let body = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };
        let response = self
            .client
            .post(self.config.endpoint("api/embed"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "ollama returned {status}: {error_text}"
            )));
        }

        let result: EmbedResponse = response.json().await?;
        if result.embeddings.len() != texts.len() {
            return Err(EmbeddingError::BatchMismatch {
                sent: texts.len(),
                received: result.embeddings.len(),
            });
        }

        let mut vectors = result.embeddings;
        for vector in vectors.iter_mut() {
            check_dimension(self.dimension, vector)?;
            normalize(vector);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding batch of {} texts with model {}",
            texts.len(),
            self.config.model
        );

        let attempts = self.config.attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.request(texts).await {
                Ok(vectors) => return Ok(vectors),
                // A wrong shape will not fix itself on retry.
                Err(e @ EmbeddingError::DimensionMismatch { .. }) => return Err(e),
                Err(e) => {
                    warn!("Ollama embed attempt {attempt}/{attempts} failed: {e}");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        Err(EmbeddingError::Unavailable(match last_error {
            Some(e) => e.to_string(),
            None => "no attempt made".to_string(),
        }))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OllamaConfig {
        OllamaConfig::new("nomic-embed-text")
            .with_host(server.uri())
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_embed_batch_normalizes_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[3.0, 4.0], [0.0, 2.0]]
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(config(&server), 2).unwrap();
        assert_eq!(provider.model(), "nomic-embed-text:latest");

        let vectors = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.6, 0.8], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_batch_length_mismatch_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0]]
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(config(&server).with_attempts(1), 2).unwrap();
        let err = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(config(&server), 2).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0, 0.0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(config(&server), 2).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }
}
