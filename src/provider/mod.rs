// src/provider/mod.rs
// Upstream source traits and the SSE pump shared by the concrete clients

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{SseDecoder, SseFrame};
use crate::error::{DeepClaudeError, Result};

pub mod claude;
pub mod deepseek;
pub mod think;

pub use claude::{ClaudeClient, ClaudeProvider};
pub use deepseek::DeepSeekClient;

/// Buffer between an upstream pump task and the stage reading from it
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// Message format for all providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == ROLE_SYSTEM
    }
}

/// Tagged events produced by the upstream sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental thinking text from the reasoning model
    Reasoning(String),
    /// First piece of final content; marks the end of reasoning
    Content(String),
    /// Incremental answer text from the answer model
    Answer(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Reasoning(_) => "reasoning",
            StreamEvent::Content(_) => "content",
            StreamEvent::Answer(_) => "answer",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            StreamEvent::Reasoning(t) | StreamEvent::Content(t) | StreamEvent::Answer(t) => t,
        }
    }
}

/// Receiving end of an upstream stream; faults arrive in-band as `Err`
pub type EventReceiver = mpsc::Receiver<Result<StreamEvent>>;

/// Upstream that thinks before answering
#[async_trait]
pub trait ReasoningSource: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Start a streaming completion.
    ///
    /// `origin_reasoning` selects whether thinking arrives in a dedicated
    /// `reasoning_content` field or inline between `<think>` tags.
    async fn stream_reasoning(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        origin_reasoning: bool,
    ) -> Result<EventReceiver>;
}

/// Upstream that writes the final answer
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    async fn stream_answer(&self, messages: Vec<ChatMessage>, model: &str)
        -> Result<EventReceiver>;
}

// ============================================================================
// SSE pump
// ============================================================================

/// What a client makes of one SSE frame
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Events(Vec<StreamEvent>),
    End,
}

/// Per-provider translation from SSE frames to events
pub(crate) trait FrameInterpreter: Send + 'static {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<FrameOutcome>;

    /// Events still pending when the body ends
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

/// Fail with the upstream body if the status isn't 2xx
pub(crate) async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("(failed to read body: {})", e));
    Err(DeepClaudeError::UpstreamStatus {
        provider,
        status,
        body,
    })
}

/// Spawn a task that decodes `response` and feeds interpreted events into a channel
pub(crate) fn spawn_pump<I: FrameInterpreter>(
    provider: &'static str,
    response: reqwest::Response,
    interpreter: I,
) -> EventReceiver {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(pump_sse(provider, response, tx, interpreter));
    rx
}

/// Read the body until it ends, faults, or the receiver goes away.
///
/// The response (and its connection) is dropped on every return path.
async fn pump_sse<I: FrameInterpreter>(
    provider: &'static str,
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamEvent>>,
    mut interpreter: I,
) {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    'read: loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!(provider, "consumer dropped, closing upstream stream");
                return;
            }
            next = stream.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                let _ = tx.send(Err(DeepClaudeError::Http(e))).await;
                return;
            }
            None => break 'read,
        };

        for frame in decoder.push(&chunk) {
            match interpreter.on_frame(&frame) {
                Ok(FrameOutcome::Events(events)) => {
                    for event in events {
                        if tx.send(Ok(event)).await.is_err() {
                            debug!(provider, "consumer dropped, closing upstream stream");
                            return;
                        }
                    }
                }
                Ok(FrameOutcome::End) => break 'read,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }

    for event in interpreter.finish() {
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
    }
    debug!(provider, "upstream stream finished");
}
