//! OpenAI-compatible inference backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use threadlens_core::defaults;
use threadlens_core::{EmbeddingBackend, Error, GenerationBackend, Result, Vector};

use super::error::{to_threadlens_error, OpenAIErrorCode, OpenAIOperation};
use super::types::*;

/// Configuration for OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    pub timeout_seconds: u64,
    /// Extra attempts after a 429 or 5xx answer.
    pub max_retries: u32,
    /// Attempt `n` waits `retry_base_delay * (n + 1)`.
    pub retry_base_delay: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::INFERENCE_TIMEOUT_SECS,
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl OpenAIConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
    /// | `OPENAI_API_KEY` | unset |
    /// | `OPENAI_EMBED_MODEL` | `text-embedding-3-small` |
    /// | `OPENAI_GEN_MODEL` | `gpt-4o-mini` |
    /// | `OPENAI_EMBED_DIM` | `1536` |
    /// | `OPENAI_TIMEOUT` | `60` |
    /// | `OPENAI_MAX_RETRIES` | `2` |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(base.base_url),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            embed_model: std::env::var("OPENAI_EMBED_MODEL").unwrap_or(base.embed_model),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(base.gen_model),
            embed_dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.embed_dimension),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
            max_retries: std::env::var("OPENAI_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.max_retries),
            retry_base_delay: base.retry_base_delay,
        }
    }
}

/// OpenAI-compatible embedding and chat backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// POST `body` to `endpoint`, retrying rate-limit and server errors.
    async fn post_json<Req, Resp>(
        &self,
        endpoint: &str,
        body: &Req,
        op: OpenAIOperation,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut attempt: u32 = 0;
        loop {
            let response = self
                .build_request(endpoint)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    to_threadlens_error(
                        OpenAIErrorCode::Unknown,
                        op,
                        &format!("Request failed: {}", e),
                    )
                })?;

            let status = response.status();
            if status.is_success() {
                return response.json::<Resp>().await.map_err(|e| {
                    to_threadlens_error(
                        OpenAIErrorCode::Unknown,
                        op,
                        &format!("Failed to parse response: {}", e),
                    )
                });
            }

            let body: OpenAIErrorResponse = response
                .json()
                .await
                .unwrap_or_else(|_| OpenAIErrorResponse::unknown());
            let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);

            if code.is_retryable() && attempt < self.config.max_retries {
                let delay = self.config.retry_base_delay * (attempt + 1);
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    endpoint,
                    status = status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable OpenAI error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(to_threadlens_error(
                code,
                op,
                &format!("OpenAI returned {}: {}", status, body.error.message),
            ));
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            count = texts.len(),
            model = %self.config.embed_model,
            "Embedding texts"
        );

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let result: EmbeddingResponse = self
            .post_json("/embeddings", &request, OpenAIOperation::Embedding)
            .await?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| Vector::from(d.embedding))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(
            model = %self.config.gen_model,
            prompt_len = prompt.len(),
            "Generating"
        );

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", prompt));

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: Some(0.0),
            max_tokens: None,
        };

        let result: ChatCompletionResponse = self
            .post_json("/chat/completions", &request, OpenAIOperation::Generation)
            .await?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}
