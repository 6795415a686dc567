//! DeepSeek reasoning client (Chat Completions API)
//!
//! Streams an OpenAI-compatible chat completion and reports thinking as
//! `Reasoning` events. The first piece of real content becomes a `Content`
//! marker, which is what tells the relay that reasoning is over.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::think::ThinkTagParser;
use super::{
    ChatMessage, EventReceiver, FrameInterpreter, FrameOutcome, ReasoningSource, StreamEvent,
    check_status, spawn_pump,
};
use crate::core::SseFrame;
use crate::error::{DeepClaudeError, Result};

pub const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";

const PROVIDER: &str = "deepseek";

/// Streaming client for DeepSeek-style reasoning models
pub struct DeepSeekClient {
    client: HttpClient,
    api_key: String,
    api_url: String,
}

impl DeepSeekClient {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self::with_http_client(HttpClient::new(), api_key, api_url)
    }

    pub fn with_http_client(
        client: HttpClient,
        api_key: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl ReasoningSource for DeepSeekClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_reasoning(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        origin_reasoning: bool,
    ) -> Result<EventReceiver> {
        let body = ChatCompletionRequest {
            model,
            messages: &messages,
            stream: true,
        };

        debug!(
            model,
            messages = messages.len(),
            origin_reasoning,
            "DeepSeek stream request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;
        let response = check_status(PROVIDER, response).await?;

        Ok(spawn_pump(
            PROVIDER,
            response,
            DeltaInterpreter::new(origin_reasoning),
        ))
    }
}

// ============================================================================
// Delta interpretation
// ============================================================================

/// Turns chat completion deltas into reasoning/content events
pub(crate) struct DeltaInterpreter {
    origin_reasoning: bool,
    think: ThinkTagParser,
}

impl DeltaInterpreter {
    pub(crate) fn new(origin_reasoning: bool) -> Self {
        Self {
            origin_reasoning,
            think: ThinkTagParser::new(),
        }
    }

    fn interpret(&mut self, delta: ChatStreamDelta) -> Vec<StreamEvent> {
        let reasoning = delta.reasoning_content.filter(|s| !s.is_empty());
        let content = delta.content.filter(|s| !s.is_empty());

        if self.origin_reasoning {
            match (reasoning, content) {
                (Some(r), _) => vec![StreamEvent::Reasoning(r)],
                (None, Some(c)) => vec![StreamEvent::Content(c)],
                (None, None) => Vec::new(),
            }
        } else {
            content.map(|c| self.think.push(&c)).unwrap_or_default()
        }
    }
}

impl FrameInterpreter for DeltaInterpreter {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<FrameOutcome> {
        if frame.is_done() {
            return Ok(FrameOutcome::End);
        }

        let chunk: ChatStreamChunk = frame.parse()?;
        if let Some(error) = chunk.error {
            return Err(DeepClaudeError::upstream(PROVIDER, error.message));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                events.extend(self.interpret(delta));
            }
        }
        Ok(FrameOutcome::Events(events))
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.origin_reasoning {
            Vec::new()
        } else {
            self.think.finish()
        }
    }
}

// ============================================================================
// DeepSeek API Types (OpenAI-compatible Chat Completions format)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: Option<ChatStreamDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}
