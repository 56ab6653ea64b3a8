//! Chat-completion client for the orchestrator model.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use dashboard::TokenCounts;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::conversation::ChatMessage;
use crate::core::pane::truncate_for_log;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-opus-4.6";

/// Assistant text plus token accounting for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenCounts,
}

/// Something that can answer a conversation.
pub trait ChatClient {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<ChatReply>;

    /// Model identifier, for event metadata.
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

impl ChatClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<ChatReply> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("chat completion request")?;

        let status = response.status().as_u16();
        let body = response.text().context("read chat completion response")?;
        debug!(status, len = body.len(), "chat completion response");
        parse_completion(status, &body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Turn an HTTP status and body into a reply or a descriptive error.
pub fn parse_completion(status: u16, body: &str) -> Result<ChatReply> {
    if status != 200 {
        if let Ok(err) = serde_json::from_str::<ErrorResponse>(body)
            && !err.error.message.is_empty()
        {
            return Err(match err.error.code {
                Some(code) => anyhow!("API error {status} (code {code}): {}", err.error.message),
                None => anyhow!("API error {status}: {}", err.error.message),
            });
        }
        bail!("HTTP {status}: {}", truncate_for_log(body, 200));
    }

    let parsed: CompletionResponse =
        serde_json::from_str(body).context("parse chat completion response")?;
    let usage = TokenCounts {
        prompt: parsed.usage.prompt_tokens,
        completion: parsed.usage.completion_tokens,
        total: parsed.usage.total_tokens,
    };
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("empty choices in response"))?;

    Ok(ChatReply {
        content: choice.message.content.unwrap_or_default(),
        usage,
    })
}
