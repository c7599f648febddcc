/// LLM Client — the single point of entry for local model inference.
///
/// No other module talks to the inference runtime directly; the assistant
/// goes through `InferenceRuntime` / `InferenceContext`, which makes the
/// runtime swappable for test doubles.
///
/// The shipped runtime is a llama.cpp-compatible HTTP server running next
/// to the service (`POST /completion`, `GET /health`).
///
/// `HttpInferenceRuntime::load` only checks the server's health; it cannot
/// point the server at a file. The server must be started on the same model
/// file the model manager resolves, or answers come from a different model.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod prompts;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Inference context has been released")]
    Released,
}

/// Deterministic generation settings for résumé answers.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    /// Token budget for one answer.
    pub n_predict: u32,
    pub stop: Vec<String>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            n_predict: 200,
            stop: prompts::STOP_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A loaded model, ready to generate text.
#[async_trait]
pub trait InferenceContext: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError>;

    /// Frees the context. Calling it twice is harmless.
    async fn release(&self);
}

/// Loads models into inference contexts.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn InferenceContext>, LlmError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    stop: &'a [String],
    stream: bool,
    cache_prompt: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    #[serde(default)]
    pub tokens_predicted: u32,
    #[serde(default)]
    pub tokens_evaluated: u32,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    error: ServerErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    message: String,
}

/// Runtime backed by a llama.cpp-compatible server.
#[derive(Clone)]
pub struct HttpInferenceRuntime {
    client: Client,
    base_url: String,
}

impl HttpInferenceRuntime {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InferenceRuntime for HttpInferenceRuntime {
    /// Verifies the server is up and has its model loaded.
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn InferenceContext>, LlmError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(body),
            });
        }

        let body = response.text().await?;
        let health: HealthResponse = serde_json::from_str(&body)?;
        if health.status != "ok" {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: format!("Inference server not ready: {}", health.status),
            });
        }

        info!(
            "Inference context ready at {} for {}",
            self.base_url,
            model_path.display()
        );
        Ok(Arc::new(HttpInferenceContext {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model_path: model_path.to_path_buf(),
            released: AtomicBool::new(false),
        }))
    }
}

pub struct HttpInferenceContext {
    client: Client,
    base_url: String,
    model_path: PathBuf,
    released: AtomicBool,
}

impl HttpInferenceContext {
    /// Makes a raw completion call, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> Result<CompletionResponse, LlmError> {
        let request_body = CompletionRequest {
            prompt,
            n_predict: params.n_predict,
            temperature: params.temperature,
            stop: &params.stop,
            stream: false,
            cache_prompt: true,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Inference attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(format!("{}/completion", self.base_url))
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Inference server returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(body),
                });
            }

            let body = response.text().await?;
            let completion: CompletionResponse = serde_json::from_str(&body)?;

            debug!(
                "Inference call succeeded: tokens_evaluated={}, tokens_predicted={}",
                completion.tokens_evaluated, completion.tokens_predicted
            );

            return Ok(completion);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl InferenceContext for HttpInferenceContext {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError> {
        if self.released.load(Ordering::Acquire) {
            return Err(LlmError::Released);
        }
        let completion = self.call(prompt, params).await?;
        if completion.content.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(completion.content)
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("Released inference context for {}", self.model_path.display());
        }
    }
}

/// Pulls `error.message` out of a server error body, else the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<ServerError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}
