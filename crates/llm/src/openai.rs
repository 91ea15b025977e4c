//! Chat-completions provider.
//!
//! One HTTP call per request, JSON-object response format, no retries. A
//! failed call surfaces as [`ServiceError`] and fails the run.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use pipeline::adjudication::AdjudicationRequest;
use pipeline::generation::GenerationRequest;
use pipeline::ports::{Adjudicator, ContentGenerator, ServiceError};

use crate::prompt::{generation_prompt, REVIEWER_SYSTEM_PROMPT};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

const ADJUDICATION_TEMPERATURE: f32 = 0.2;
const GENERATION_TEMPERATURE: f32 = 0.3;
const BODY_SNIPPET: usize = 500;

/// Connection settings for [`OpenAiProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Settings for the public API with the default model and a 60 s timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Adjudicator and content generator backed by a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    /// Builds the provider. An empty API key is a configuration error.
    pub fn new(config: OpenAiConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::NotConfigured("model API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        let body = ChatRequest {
            model: &self.config.model,
            temperature,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Model API returned an error status");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: text.chars().take(BODY_SNIPPET).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Malformed("response has no message content".into()))?;
        debug!(chars = content.len(), "Model reply received");
        Ok(content)
    }
}

#[async_trait]
impl Adjudicator for OpenAiProvider {
    #[instrument(skip(self, request), fields(model = %self.config.model, entries = request.changed_entries.len()))]
    async fn adjudicate(&self, request: &AdjudicationRequest) -> Result<String, ServiceError> {
        let prompt = request
            .render()
            .map_err(|e| ServiceError::Malformed(format!("request could not be rendered: {e}")))?;
        self.complete(Some(REVIEWER_SYSTEM_PROMPT), &prompt, ADJUDICATION_TEMPERATURE)
            .await
    }
}

#[async_trait]
impl ContentGenerator for OpenAiProvider {
    #[instrument(skip(self, request), fields(model = %self.config.model, url = %request.url))]
    async fn generate_entry(&self, request: &GenerationRequest) -> Result<Value, ServiceError> {
        let content = self
            .complete(None, &generation_prompt(request), GENERATION_TEMPERATURE)
            .await?;
        serde_json::from_str(&content)
            .map_err(|e| ServiceError::Malformed(format!("generated entry is not JSON: {e}")))
    }
}
