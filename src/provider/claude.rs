// src/provider/claude.rs
// Claude answer client: Anthropic Messages API, or an OpenAI-compatible gateway

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{
    AnswerSource, ChatMessage, EventReceiver, FrameInterpreter, FrameOutcome, StreamEvent,
    check_status, spawn_pump,
};
use crate::core::SseFrame;
use crate::error::{DeepClaudeError, Result};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

const PROVIDER: &str = "claude";

/// Where Claude is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaudeProvider {
    /// Anthropic's own Messages API
    #[default]
    Anthropic,
    /// OpenRouter's OpenAI-compatible endpoint
    OpenRouter,
    /// A one-api style OpenAI-compatible gateway
    OneApi,
}

impl ClaudeProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaudeProvider::Anthropic => "anthropic",
            ClaudeProvider::OpenRouter => "openrouter",
            ClaudeProvider::OneApi => "oneapi",
        }
    }

    /// Gateways that speak the Chat Completions wire format
    fn is_openai_compatible(&self) -> bool {
        !matches!(self, ClaudeProvider::Anthropic)
    }
}

impl fmt::Display for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaudeProvider {
    type Err = DeepClaudeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ClaudeProvider::Anthropic),
            "openrouter" => Ok(ClaudeProvider::OpenRouter),
            "oneapi" | "one-api" => Ok(ClaudeProvider::OneApi),
            other => Err(DeepClaudeError::Config(format!(
                "unknown claude provider '{}' (expected anthropic, openrouter or oneapi)",
                other
            ))),
        }
    }
}

/// OpenRouter names Claude models as `anthropic/<model>`
fn openrouter_model_id(model: &str) -> String {
    if model.contains('/') {
        model.to_string()
    } else if model.starts_with("claude-3-5-sonnet") {
        "anthropic/claude-3.5-sonnet".to_string()
    } else {
        format!("anthropic/{}", model)
    }
}

/// Streaming client for Claude answer models
pub struct ClaudeClient {
    client: HttpClient,
    api_key: String,
    api_url: String,
    provider: ClaudeProvider,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        provider: ClaudeProvider,
    ) -> Self {
        Self {
            client: HttpClient::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
            provider,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, messages: &[ChatMessage], model: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(&self.api_url)
            .header("Accept", "text/event-stream");

        match self.provider {
            ClaudeProvider::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&MessagesRequest {
                    model,
                    messages,
                    max_tokens: self.max_tokens,
                    stream: true,
                }),
            ClaudeProvider::OpenRouter => request
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("X-Title", "DeepClaude")
                .json(&CompletionsRequest {
                    model: &openrouter_model_id(model),
                    messages,
                    max_tokens: self.max_tokens,
                    stream: true,
                }),
            ClaudeProvider::OneApi => request
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&CompletionsRequest {
                    model,
                    messages,
                    max_tokens: self.max_tokens,
                    stream: true,
                }),
        }
    }
}

#[async_trait]
impl AnswerSource for ClaudeClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_answer(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<EventReceiver> {
        debug!(
            model,
            provider = %self.provider,
            messages = messages.len(),
            "Claude stream request"
        );

        let response = self.build_request(&messages, model).send().await?;
        let response = check_status(PROVIDER, response).await?;

        Ok(if self.provider.is_openai_compatible() {
            spawn_pump(PROVIDER, response, CompletionsInterpreter)
        } else {
            spawn_pump(PROVIDER, response, MessagesInterpreter)
        })
    }
}

// ============================================================================
// Anthropic Messages streaming
// ============================================================================

/// Reads `content_block_delta` text out of an Anthropic event stream
pub(crate) struct MessagesInterpreter;

impl FrameInterpreter for MessagesInterpreter {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<FrameOutcome> {
        if frame.is_done() {
            return Ok(FrameOutcome::End);
        }

        let event: AnthropicStreamEvent = frame.parse()?;
        match event.event_type.as_str() {
            "content_block_delta" => {
                let text = event
                    .delta
                    .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
                    .and_then(|d| d.text)
                    .filter(|t| !t.is_empty());
                Ok(FrameOutcome::Events(
                    text.map(StreamEvent::Answer).into_iter().collect(),
                ))
            }
            "message_stop" => Ok(FrameOutcome::End),
            "error" => {
                let message = event
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown error".to_string());
                Err(DeepClaudeError::upstream(PROVIDER, message))
            }
            _ => Ok(FrameOutcome::Events(Vec::new())),
        }
    }
}

// ============================================================================
// OpenAI-compatible streaming (OpenRouter, one-api)
// ============================================================================

/// Reads `choices[].delta.content` out of a Chat Completions stream
pub(crate) struct CompletionsInterpreter;

impl FrameInterpreter for CompletionsInterpreter {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<FrameOutcome> {
        if frame.is_done() {
            return Ok(FrameOutcome::End);
        }

        let chunk: CompletionsStreamChunk = frame.parse()?;
        if let Some(error) = chunk.error {
            return Err(DeepClaudeError::upstream(PROVIDER, error.message));
        }

        let events = chunk
            .choices
            .into_iter()
            .filter_map(|c| c.delta.and_then(|d| d.content))
            .filter(|t| !t.is_empty())
            .map(StreamEvent::Answer)
            .collect();
        Ok(FrameOutcome::Events(events))
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<AnthropicDelta>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionsStreamChunk {
    #[serde(default)]
    choices: Vec<CompletionsStreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct CompletionsStreamChoice {
    delta: Option<CompletionsDelta>,
}

#[derive(Deserialize, Debug)]
struct CompletionsDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
}
