//! The generation client: the one network-facing stage of the pipeline.
//!
//! [`GenerationClient`] is object-safe so the worker holds it as
//! `Arc<dyn GenerationClient>`; tests substitute scripted implementations.
//! [`HttpGenerationClient`] speaks an OpenAI-compatible chat-completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Longest response body excerpt kept in a status error.
const MAX_ERROR_BODY: usize = 512;

const SYSTEM_MESSAGE: &str = "You are a certified strength and conditioning coach. \
     You answer with a single JSON object and nothing else.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation call timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("generation call cancelled: worker shut down before processing completed")]
    Cancelled,

    #[error("invalid generation client configuration: {0}")]
    Configuration(String),
}

/// Sends a prompt to a text-generation service and returns the raw text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Short name for logs (e.g. the model).
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    ///
    /// Must give up with [`GenerationError::Timeout`] once `deadline` has
    /// elapsed and with [`GenerationError::Cancelled`] as soon as `cancel`
    /// fires. Implementations do not retry.
    async fn generate(
        &self,
        prompt: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError>;
}

// Compile-time assertion: GenerationClient is object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn GenerationClient) {}
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Connection settings for [`HttpGenerationClient`]. Built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service for a JSON object response (`response_format`).
    pub json_mode: bool,
}

impl GenerationConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_mode: true,
        }
    }

    /// Full URL of the chat-completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
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
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a chat-completions body.
fn extract_content(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".into()))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(GenerationError::MalformedResponse(
            "first choice has no message content".into(),
        )),
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`GenerationClient`] for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Configuration("API key is empty".into()));
        }
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(GenerationError::Configuration(format!(
                "base URL {:?} must start with http:// or https://",
                config.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("regimen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    async fn call(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: self.config.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        extract_content(&body)
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            outcome = tokio::time::timeout(deadline, self.call(prompt)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(deadline)),
            },
        }
    }
}
