//! Completion client trait and implementations.
//!
//! The vendor SDK is abstracted behind [`CompletionClient`] so the backend
//! is swappable; the rest of the crate only ever sees structured JSON
//! content. [`RateLimitedClient`] is the decorator every production call
//! path goes through: it acquires from the dual-bucket limiter, retries
//! transient failures with jittered backoff, and records actual token
//! usage back into the window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::limiter::{LlmRateLimiter, RetryPolicy};

use super::types::{CompletionRequest, CompletionResponse, Provider, TokenUsage};

/// Completion capability: structured-JSON completions plus an optional
/// embedding capability used by the semantic dedup layer.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Embed texts for similarity comparison. Backends without an embedding
    /// capability return an operational error; callers degrade gracefully.
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::operational("no embedding capability available"))
    }

    /// Get the provider for this client.
    fn provider(&self) -> Provider;
}

/// Configuration for HTTP-backed clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: default_model.into(),
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Anthropic messages-API client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let api_request = AnthropicRequest {
            model,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: request.system.clone(),
            temperature: request.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url());
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(self.config.timeout_secs * 1000)
                } else {
                    Error::transient(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body = response
            .text()
            .await
            .map_err(|e| Error::transient(format!("failed to read response: {e}")))?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::Transient {
                message: format!("Anthropic API {status}: {body}"),
                retry_after_ms: retry_after,
            });
        }
        if !status.is_success() {
            return Err(Error::llm_api(
                "anthropic",
                format!("{status}: {body}"),
            ));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| Error::llm_api("anthropic", format!("unparseable response: {e}")))?;

        let content = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            model: api_response.model,
            content,
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
            timestamp: Utc::now(),
        })
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// Scripted mock client for tests and mock mode.
///
/// Responses are popped in FIFO order; once the script is exhausted the
/// default response is returned. Embeddings, when enabled, are
/// deterministic hashes of the input text so similarity comparisons are
/// stable across runs.
pub struct MockCompletionClient {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    embeddings_enabled: bool,
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: "[]".to_string(),
            embeddings_enabled: false,
        }
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    pub fn with_embeddings(mut self) -> Self {
        self.embeddings_enabled = true;
        self
    }

    /// Queue the next scripted response.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .push_back(response.into());
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let content = self
            .responses
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        Ok(CompletionResponse {
            model: "mock".to_string(),
            content,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 10,
            },
            timestamp: Utc::now(),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.embeddings_enabled {
            return Err(Error::operational("no embedding capability available"));
        }
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }

    fn provider(&self) -> Provider {
        Provider::Mock
    }
}

/// 16-dimensional deterministic embedding from a SHA-256 digest.
fn hash_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.to_lowercase().as_bytes());
    digest
        .chunks(2)
        .map(|pair| (u16::from_be_bytes([pair[0], pair[1]]) as f32) / (u16::MAX as f32))
        .collect()
}

/// Decorator routing every call through the rate limiter with retry.
pub struct RateLimitedClient {
    inner: Arc<dyn CompletionClient>,
    limiter: Arc<LlmRateLimiter>,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn CompletionClient>, limiter: Arc<LlmRateLimiter>) -> Self {
        Self {
            inner,
            limiter,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl CompletionClient for RateLimitedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let estimate = request.estimated_tokens();
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire(estimate).await?;
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    self.limiter.record_usage(estimate, response.usage.total());
                    return Ok(response);
                }
                Err(e) if e.is_transient() => {
                    let hint = e.retry_after_ms();
                    self.retry.backoff(attempt, hint).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed(texts).await
    }

    fn provider(&self) -> Provider {
        self.inner.provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_pops_scripted_responses_in_order() {
        let mock = MockCompletionClient::new().with_default_response("{}");
        mock.push_response("first");
        mock.push_response("second");

        let req = CompletionRequest::new("x");
        assert_eq!(mock.complete(req.clone()).await.unwrap().content, "first");
        assert_eq!(mock.complete(req.clone()).await.unwrap().content, "second");
        assert_eq!(mock.complete(req).await.unwrap().content, "{}");
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_optional() {
        let plain = MockCompletionClient::new();
        assert!(plain.embed(&["a".to_string()]).await.is_err());

        let embedding = MockCompletionClient::new().with_embeddings();
        let a = embedding.embed(&["same text".to_string()]).await.unwrap();
        let b = embedding.embed(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);
    }

    #[tokio::test]
    async fn rate_limited_client_passes_through() {
        let mock = Arc::new(MockCompletionClient::new().with_default_response("ok"));
        let limiter = Arc::new(LlmRateLimiter::new(10, 100_000));
        let client = RateLimitedClient::new(mock, limiter);

        let response = client.complete(CompletionRequest::new("hello")).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(client.provider(), Provider::Mock);
    }
}
