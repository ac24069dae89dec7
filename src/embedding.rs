//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two concrete backends:
//! - **[`OllamaEmbedder`]** — calls a local Ollama daemon's embeddings API.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API.
//!
//! Both batch requests and retry transient failures with exponential
//! backoff (1s, 2s, 4s, 8s, 16s, 32s, capped at 2^5). HTTP 4xx other than
//! 429 fails immediately.
//!
//! Also provides vector utilities shared with the store layer:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB encoding
//!   for SQLite storage

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::IndexError;

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed_batch(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Retry a request closure with exponential backoff.
///
/// The closure returns `Ok(Some(vectors))` on success, `Ok(None)` for a
/// retryable failure, and `Err` for a permanent one.
async fn with_retries<F, Fut>(max_retries: u32, mut call: F) -> Result<Vec<Vec<f32>>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<Vec<Vec<f32>>>>>,
{
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(Some(vectors)) => return Ok(vectors),
            Ok(None) => {
                last_err = Some(anyhow!("retryable embedding failure"));
                continue;
            }
            Err(e) => {
                if is_permanent(&e) {
                    return Err(e);
                }
                last_err = Some(e);
                continue;
            }
        }
    }

    let cause = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "exhausted retries".to_string());
    Err(IndexError::EmbeddingFailure(cause).into())
}

fn is_permanent(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PermanentError>().is_some()
}

/// Marker for errors that must not be retried (4xx other than 429).
#[derive(Debug)]
struct PermanentError(String);

impl std::fmt::Display for PermanentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PermanentError {}

// ============ Ollama ============

/// Embedding backend for a local Ollama daemon.
///
/// Calls `POST {base_url}/api/embeddings` once per text; the endpoint does
/// not accept batches, so the batch loop lives here.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Option<Vec<Vec<f32>>>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            // Network error: retryable.
            Err(_) => return Ok(None),
        };

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            let embedding = json
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Invalid Ollama response: missing embedding"))?;
            let vec: Vec<f32> = embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            return Ok(Some(vec![vec]));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            return Ok(None);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(PermanentError(format!("Ollama API error {}: {}", status, body_text)).into())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let mut vectors =
                with_retries(self.max_retries, || self.embed_one(text)).await?;
            out.push(vectors.remove(0));
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

// ============ OpenAI ============

/// Embedding backend for the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY` in the environment. Batches every call.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    async fn embed_call(&self, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            return Ok(Some(parse_openai_response(&json)?));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            return Ok(None);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(PermanentError(format!("OpenAI API error {}: {}", status, body_text)).into())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        with_retries(self.max_retries, || self.embed_call(texts)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
