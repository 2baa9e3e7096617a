//! Inference client
//!
//! One external completion call per analysis, wrapped in a fixed-delay retry.
//! The client does not interpret the response: the raw text goes to the
//! response normalizer.

use async_trait::async_trait;
use base64::Engine;
use insight_common::config::InferenceConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::error::{AnalysisError, AnalysisResult};
use crate::utils::RetryPolicy;

const USER_AGENT: &str = concat!("insight-ai/", env!("CARGO_PKG_VERSION"));

/// Auxiliary media sent alongside the prompt text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Media {
    /// `data:` URL form used by OpenAI-compatible image content parts
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Prompt plus model/style hints for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub text: String,
    pub media: Option<Media>,
    /// Overrides the configured model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl PromptPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Single-attempt failure from a backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One raw completion call, no retry
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, payload: &PromptPayload) -> Result<String, BackendError>;
}

/// OpenAI-compatible chat-completions backend
pub struct HttpInferenceBackend {
    http_client: reqwest::Client,
    config: InferenceConfig,
}

impl HttpInferenceBackend {
    pub fn new(config: InferenceConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn request_body(&self, payload: &PromptPayload) -> serde_json::Value {
        let content = match &payload.media {
            Some(media) => serde_json::json!([
                {"type": "text", "text": payload.text},
                {"type": "image_url", "image_url": {"url": media.to_data_url()}},
            ]),
            None => serde_json::Value::String(payload.text.clone()),
        };

        serde_json::json!({
            "model": payload.model.as_deref().unwrap_or(&self.config.model),
            "messages": [{"role": "user", "content": content}],
            "temperature": payload.temperature.unwrap_or(self.config.temperature),
            "max_tokens": payload.max_tokens.unwrap_or(self.config.max_tokens),
            "stream": false,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn complete(&self, payload: &PromptPayload) -> Result<String, BackendError> {
        let mut request = self
            .http_client
            .post(self.endpoint_url())
            .json(&self.request_body(payload));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        tracing::debug!(
            model = payload.model.as_deref().unwrap_or(&self.config.model),
            has_media = payload.media.is_some(),
            prompt_chars = payload.text.len(),
            "Sending inference request"
        );

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.config.timeout_secs)
            } else {
                BackendError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(status.as_u16(), error_text));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Parse("response has no message content".to_string()))
    }
}

/// Resilient inference client: backend call under a [`RetryPolicy`]
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn InferenceBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Raw completion text, or `INFERENCE_UNAVAILABLE` once every attempt failed
    pub async fn complete(&self, payload: &PromptPayload) -> AnalysisResult<String> {
        let start = Instant::now();

        let result = self
            .policy
            .run("inference_complete", |attempt| {
                tracing::debug!(attempt, "Inference attempt");
                self.backend.complete(payload)
            })
            .await;

        match result {
            Ok(text) => {
                tracing::debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    response_chars = text.len(),
                    "Inference completed"
                );
                Ok(text)
            }
            Err(exhausted) => Err(AnalysisError::InferenceUnavailable {
                attempts: exhausted.attempts,
                message: exhausted.last_error.to_string(),
            }),
        }
    }
}
