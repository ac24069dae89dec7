//! Text generation backends.
//!
//! The [`Generator`] trait covers both one-shot completion (intent
//! classification, non-interactive analysis) and token streaming for live
//! sessions. Streams are cancellable: dropping a [`TokenStream`] aborts the
//! producer task, and since a turn is only committed to memory after its
//! stream finishes, cancellation has no side effects on buffer or index.
//!
//! [`OllamaGenerator`] talks to a local Ollama daemon over its NDJSON
//! streaming API. [`MockGenerator`] scripts responses for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::LlmConfig;
use crate::error::SessionError;

/// A stream of generated tokens.
///
/// Pull tokens with [`next_token`](Self::next_token); `None` means the
/// generation finished. Dropping the stream aborts the underlying request.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<String>>,
    task: Option<JoinHandle<()>>,
}

impl TokenStream {
    /// Build a stream from a channel and the task feeding it.
    pub fn new(rx: mpsc::Receiver<Result<String>>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// A pre-finished stream over fixed tokens, for tests.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel(tokens.len().max(1));
        for token in tokens {
            // Capacity matches the token count; sends cannot fail.
            let _ = tx.try_send(Ok(token));
        }
        Self { rx, task: None }
    }

    /// Next token, or `None` when generation is complete.
    pub async fn next_token(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    /// Drain the remaining tokens into a single string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(token) = self.next_token().await {
            out.push_str(&token?);
        }
        Ok(out)
    }

    /// Abort generation. Nothing observed so far is retained anywhere.
    pub fn cancel(self) {}
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// One-shot completion of a prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Start a streaming generation for a prompt.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

/// Instantiate the generator named by the configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(anyhow!("Unknown llm provider: {}", other)),
    }
}

// ============ Ollama ============

/// Generator backed by a local Ollama daemon.
///
/// Uses `POST {base_url}/api/generate`; streaming responses are NDJSON
/// lines of the form `{"response": "...", "done": false}`.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::new();
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": { "temperature": self.temperature },
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt, false))
            .send()
            .await
            .map_err(|e| SessionError::GenerationFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                SessionError::GenerationFailure(format!("Ollama error {}: {}", status, body))
                    .into(),
            );
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                SessionError::GenerationFailure("missing response field".to_string()).into()
            })
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt, true))
            .send()
            .await
            .map_err(|e| SessionError::GenerationFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                SessionError::GenerationFailure(format!("Ollama error {}: {}", status, body))
                    .into(),
            );
        }

        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut pending = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(SessionError::GenerationFailure(e.to_string()).into()))
                            .await;
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // Each complete line is one NDJSON object.
                while let Some(pos) = pending.find('\n') {
                    let line = pending[..pos].trim().to_string();
                    pending.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<serde_json::Value>(&line) {
                        Ok(json) => {
                            if let Some(token) =
                                json.get("response").and_then(|r| r.as_str())
                            {
                                if !token.is_empty()
                                    && tx.send(Ok(token.to_string())).await.is_err()
                                {
                                    return;
                                }
                            }
                            if json.get("done").and_then(|d| d.as_bool()) == Some(true) {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(SessionError::GenerationFailure(format!(
                                    "malformed stream line: {}",
                                    e
                                ))
                                .into()))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(TokenStream::new(rx, task))
    }
}

// ============ Mock ============

/// Scripted generator for tests. Pops responses in order and records every
/// prompt it receives.
#[derive(Default)]
pub struct MockGenerator {
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses.into_iter().map(|s| s.to_string()).collect(),
            ),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_response(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SessionError::GenerationFailure("no scripted response".into()).into())
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.next_response(prompt)
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let text = self.next_response(prompt)?;
        let tokens = text
            .split_inclusive(' ')
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        Ok(TokenStream::from_tokens(tokens))
    }
}
