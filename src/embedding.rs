//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait the sync engine consumes and two HTTP
//! backends:
//! - **[`OpenAiEmbedder`]** — `POST /v1/embeddings` with the configured model.
//! - **[`OllamaEmbedder`]** — `POST /api/embed` on a local Ollama instance.
//!
//! Inputs are sent in groups of `embedding.batch_size` texts per request
//! so a large document never exceeds provider request limits.
//!
//! # Retry Strategy
//!
//! Both backends retry transient failures with exponential backoff
//! (1s, 2s, 4s, 8s… capped at 32s), bounded by `max_retries`:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//!
//! Failures carry an [`EmbedError`] kind so the caller can tell a
//! retryable outage from bad input.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Embedding failure, tagged by cause.
#[derive(Debug)]
pub enum EmbedError {
    /// Provider unreachable or persistently erroring; retryable next run.
    Unavailable(String),
    /// Rate limited after exhausting retries; retryable next run.
    RateLimited(String),
    /// Input the provider will never accept (e.g. empty text).
    InvalidInput(String),
}

impl EmbedError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EmbedError::InvalidInput(_))
    }
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::Unavailable(e) => write!(f, "embedding provider unavailable: {}", e),
            EmbedError::RateLimited(e) => write!(f, "embedding provider rate limited: {}", e),
            EmbedError::InvalidInput(e) => write!(f, "invalid embedding input: {}", e),
        }
    }
}

impl std::error::Error for EmbedError {}

/// An embedding backend: text in, fixed-dimension vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Create the configured [`Embedder`].
///
/// The `"disabled"` provider is an error here: callers that reach the
/// point of embedding require a working backend.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "disabled" => anyhow::bail!(
            "Embedding provider is disabled. Set [embedding] provider in config."
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

fn require_model_and_dims(config: &EmbeddingConfig) -> anyhow::Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required"))?;
    Ok((model, dims))
}

fn reject_empty_inputs(texts: &[String]) -> Result<(), EmbedError> {
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(EmbedError::InvalidInput(format!(
            "text at batch position {} is empty",
            pos
        )));
    }
    Ok(())
}

// ============ OpenAI ============

/// Embedding backend using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model, dims) = require_model_and_dims(config)?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            dims,
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn embed_batch(
        &self,
        client: &reqwest::Client,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 {
                        last_err = Some(EmbedError::RateLimited(format!(
                            "OpenAI API {}: {}",
                            status, body_text
                        )));
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(EmbedError::Unavailable(format!(
                            "OpenAI API {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(EmbedError::InvalidInput(format!(
                        "OpenAI API {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Unavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Unavailable("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        reject_empty_inputs(texts)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(&client, batch).await?);
        }
        Ok(embeddings)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Unavailable("invalid response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Unavailable("invalid response: missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model, dims) = require_model_and_dims(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            dims,
            url,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn embed_batch(
        &self,
        client: &reqwest::Client,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
                        return parse_ollama_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 {
                        last_err = Some(EmbedError::RateLimited(format!(
                            "Ollama API {}: {}",
                            status, body_text
                        )));
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(EmbedError::Unavailable(format!(
                            "Ollama API {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(EmbedError::InvalidInput(format!(
                        "Ollama API {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Unavailable(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Unavailable("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        reject_empty_inputs(texts)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(&client, batch).await?);
        }
        Ok(embeddings)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbedError::Unavailable("invalid response: missing embeddings array".into())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| EmbedError::Unavailable("invalid response: not an array".into()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_retryable() {
        assert!(EmbedError::Unavailable("x".into()).is_retryable());
        assert!(EmbedError::RateLimited("x".into()).is_retryable());
        assert!(!EmbedError::InvalidInput("x".into()).is_retryable());
    }

    #[test]
    fn test_empty_input_rejected_without_network() {
        let texts = vec!["fine".to_string(), "   ".to_string()];
        let err = reject_empty_inputs(&texts).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 2);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_parse_malformed_response() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(parse_openai_response(&json).is_err());
        assert!(parse_ollama_response(&json).is_err());
    }
}
