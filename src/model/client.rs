//! Model client for AI inference using OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use super::message::Conversation;
use crate::actions::extract_action_call;

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },
}

impl ModelError {
    /// Network failures, rate limits and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Request(_) => true,
            ModelError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
            }
            ModelError::Parse(_) | ModelError::MaxRetriesExceeded { .. } => false,
        }
    }
}

/// Configuration for the AI model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    /// Extra top-level fields merged into every request body.
    pub extra_body: HashMap<String, Value>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let mut extra_body = HashMap::new();
        extra_body.insert("skip_special_tokens".to_string(), json!(false));

        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            max_tokens: 3000,
            temperature: 0.0,
            top_p: 0.85,
            frequency_penalty: 0.2,
            extra_body,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Response from the AI model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub thinking: String,
    pub action: String,
    pub raw_content: String,
}

impl ModelResponse {
    /// Split raw model output into thinking and action text.
    pub fn from_raw(raw_content: impl Into<String>) -> Self {
        let raw_content = raw_content.into();
        let (thinking, action) = parse_response(&raw_content);
        Self {
            thinking,
            action,
            raw_content,
        }
    }
}

/// A vision-language model that picks the next action.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn request(&self, conversation: &Conversation) -> Result<ModelResponse, ModelError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible vision-language models.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn request_body(&self, conversation: &Conversation) -> Value {
        let mut body = json!({
            "messages": conversation,
            "model": self.config.model_name,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "frequency_penalty": self.config.frequency_penalty,
        });

        if let Value::Object(ref mut map) = body {
            for (key, value) in &self.config.extra_body {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }

    /// Send a single request to the API.
    async fn send_request(&self, url: &str, body: &Value) -> Result<ModelResponse, ModelError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let raw_content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::Parse("No choices in response".to_string()))?;

        Ok(ModelResponse::from_raw(raw_content))
    }
}

#[async_trait]
impl LanguageModel for ModelClient {
    async fn request(&self, conversation: &Conversation) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(conversation);

        let max_attempts = self.config.max_retries + 1;
        let mut last_error: Option<ModelError> = None;

        for attempt in 1..=max_attempts {
            match self.send_request(&url, &body).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            "Request failed (attempt {}/{}): {}. Retrying in {}s",
                            attempt,
                            max_attempts,
                            e,
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ModelError::MaxRetriesExceeded {
            attempts: max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

fn strip_think_tags(text: &str) -> String {
    text.replace("<think>", "").replace("</think>", "").trim().to_string()
}

/// Parse the model response into thinking and action parts.
///
/// An `<answer>` tag wins. Without one, the last `do(...)`/`finish(...)`
/// call is the action and what precedes it is the thinking.
pub fn parse_response(content: &str) -> (String, String) {
    if let Some((before, after)) = content.split_once("<answer>") {
        let action = after.replace("</answer>", "").trim().to_string();
        return (strip_think_tags(before), action);
    }

    if let Some((start, call)) = extract_action_call(content) {
        return (strip_think_tags(&content[..start]), call.to_string());
    }

    (String::new(), content.trim().to_string())
}
