//! Reasoning and answer stages
//!
//! Each stage runs as its own task. They share nothing except the one-shot
//! hand-off (reasoning text, written once, read once) and the merge channel.
//! Every fault inside a stage is logged and swallowed here.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::chunk::{ProtocolChunk, RequestIdentity};
use super::sequencer::{MergeItem, Stage};
use crate::error::{DeepClaudeError, Result};
use crate::provider::{AnswerSource, ChatMessage, EventReceiver, ReasoningSource, StreamEvent};

/// Stand-in reasoning when the reasoning stage delivered nothing
pub const REASONING_PLACEHOLDER: &str = "Failed to retrieve reasoning content";

/// Assistant turn that carries the reasoning into the answer model's context
pub fn reasoning_preamble(reasoning: &str) -> String {
    format!(
        "Here's my reasoning process:\n{}\n\nBased on this reasoning, I will now provide my response:",
        reasoning
    )
}

/// History for the answer model: input + reasoning preamble, minus system turns
pub fn build_answer_history(messages: &[ChatMessage], reasoning: &str) -> Vec<ChatMessage> {
    let mut history = messages.to_vec();
    history.push(ChatMessage::assistant(reasoning_preamble(reasoning)));
    history.retain(|m| !m.is_system());
    history
}

/// First 50 chars, for debug logs
fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

// ============================================================================
// Stage output
// ============================================================================

/// A stage's handle on the merge channel.
///
/// Dropping it writes the stage's `StageFinished` marker, so the marker goes
/// out exactly once on every exit path, panics included.
pub(crate) struct StageOutput {
    stage: Stage,
    merge: mpsc::UnboundedSender<MergeItem>,
}

impl StageOutput {
    pub(crate) fn new(stage: Stage, merge: mpsc::UnboundedSender<MergeItem>) -> Self {
        Self { stage, merge }
    }

    /// Publish a chunk; fails once the sequencer is gone
    fn emit(&self, chunk: ProtocolChunk) -> Result<()> {
        self.merge
            .send(MergeItem::Chunk(chunk))
            .map_err(|_| DeepClaudeError::Cancelled)
    }
}

impl Drop for StageOutput {
    fn drop(&mut self) {
        let _ = self.merge.send(MergeItem::StageFinished(self.stage));
    }
}

/// Next upstream event, or `Cancelled` if the caller went away first
async fn next_event(
    events: &mut EventReceiver,
    cancel: &CancellationToken,
) -> Result<Option<StreamEvent>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DeepClaudeError::Cancelled),
        event = events.recv() => event.transpose(),
    }
}

// ============================================================================
// Reasoning stage
// ============================================================================

pub(crate) struct ReasoningStage {
    pub(crate) source: Arc<dyn ReasoningSource>,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) model: String,
    pub(crate) origin_reasoning: bool,
    pub(crate) identity: RequestIdentity,
    pub(crate) output: StageOutput,
    pub(crate) cancel: CancellationToken,
}

impl ReasoningStage {
    /// Relay thinking, then hand the aggregate (or "" on failure) to the answer stage
    pub(crate) async fn run(mut self, handoff: oneshot::Sender<String>) {
        info!(
            request_id = %self.identity.id,
            model = %self.model,
            source = self.source.name(),
            "reasoning stage started"
        );

        let reasoning = match self.collect().await {
            Ok(text) => text,
            Err(DeepClaudeError::Cancelled) => {
                debug!(request_id = %self.identity.id, "reasoning stage cancelled");
                String::new()
            }
            Err(e) => {
                error!(request_id = %self.identity.id, error = %e, "reasoning stream failed");
                String::new()
            }
        };

        if handoff.send(reasoning).is_err() {
            debug!(request_id = %self.identity.id, "answer stage gone before hand-off");
        }
        info!(request_id = %self.identity.id, "reasoning stage finished");
    }

    async fn collect(&mut self) -> Result<String> {
        let messages = std::mem::take(&mut self.messages);
        let mut events = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DeepClaudeError::Cancelled),
            events = self.source.stream_reasoning(messages, &self.model, self.origin_reasoning) => events?,
        };

        let mut fragments: Vec<String> = Vec::new();
        while let Some(event) = next_event(&mut events, &self.cancel).await? {
            debug!(
                request_id = %self.identity.id,
                kind = event.kind(),
                preview = %preview(event.text()),
                "reasoning event"
            );
            match event {
                StreamEvent::Reasoning(text) => {
                    self.output
                        .emit(ProtocolChunk::reasoning(&self.identity, &self.model, text.as_str()))?;
                    fragments.push(text);
                }
                // The marker's own text is not forwarded or kept
                StreamEvent::Content(_) => {
                    let reasoning = fragments.concat();
                    info!(
                        request_id = %self.identity.id,
                        reasoning_len = reasoning.len(),
                        "reasoning complete"
                    );
                    return Ok(reasoning);
                }
                StreamEvent::Answer(_) => {
                    warn!(request_id = %self.identity.id, "ignoring answer event from reasoning source");
                }
            }
        }

        debug!(
            request_id = %self.identity.id,
            fragments = fragments.len(),
            "reasoning source ended without a content marker"
        );
        Ok(fragments.concat())
    }
}

// ============================================================================
// Answer stage
// ============================================================================

pub(crate) struct AnswerStage {
    pub(crate) source: Arc<dyn AnswerSource>,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) model: String,
    pub(crate) identity: RequestIdentity,
    pub(crate) output: StageOutput,
    pub(crate) cancel: CancellationToken,
}

/// Hand-off value, or `EmptyReasoning` if nothing usable arrived
fn usable_reasoning(
    delivered: std::result::Result<String, oneshot::error::RecvError>,
) -> Result<String> {
    match delivered {
        Ok(text) if !text.is_empty() => Ok(text),
        _ => Err(DeepClaudeError::EmptyReasoning),
    }
}

impl AnswerStage {
    /// Wait for reasoning, rewrite the history, relay the answer
    pub(crate) async fn run(self, handoff: oneshot::Receiver<String>) {
        info!(request_id = %self.identity.id, "answer stage waiting for reasoning");

        let delivered = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(request_id = %self.identity.id, "answer stage cancelled before hand-off");
                return;
            }
            delivered = handoff => delivered,
        };

        let reasoning = usable_reasoning(delivered).unwrap_or_else(|e| {
            warn!(request_id = %self.identity.id, error = %e, "using placeholder reasoning");
            REASONING_PLACEHOLDER.to_string()
        });
        debug!(request_id = %self.identity.id, reasoning_len = reasoning.len(), "hand-off received");

        let history = build_answer_history(&self.messages, &reasoning);

        match self.relay(history).await {
            Ok(fragments) => info!(
                request_id = %self.identity.id,
                fragments,
                "answer stage finished"
            ),
            Err(DeepClaudeError::Cancelled) => {
                debug!(request_id = %self.identity.id, "answer stage cancelled")
            }
            Err(e) => error!(request_id = %self.identity.id, error = %e, "answer stream failed"),
        }
    }

    async fn relay(&self, history: Vec<ChatMessage>) -> Result<usize> {
        info!(
            request_id = %self.identity.id,
            model = %self.model,
            source = self.source.name(),
            messages = history.len(),
            "answer stream starting"
        );

        let mut events = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DeepClaudeError::Cancelled),
            events = self.source.stream_answer(history, &self.model) => events?,
        };

        let mut fragments = 0;
        while let Some(event) = next_event(&mut events, &self.cancel).await? {
            match event {
                StreamEvent::Answer(text) => {
                    self.output
                        .emit(ProtocolChunk::answer(&self.identity, &self.model, text))?;
                    fragments += 1;
                }
                other => {
                    warn!(
                        request_id = %self.identity.id,
                        kind = other.kind(),
                        "ignoring non-answer event from answer source"
                    );
                }
            }
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_rewrite() {
        let input = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("What is 2+2?"),
            ChatMessage::assistant("Earlier reply"),
            ChatMessage::system("Second system note"),
            ChatMessage::user("And 3+3?"),
        ];
        let history = build_answer_history(&input, "ab");

        assert_eq!(
            history,
            vec![
                ChatMessage::user("What is 2+2?"),
                ChatMessage::assistant("Earlier reply"),
                ChatMessage::user("And 3+3?"),
                ChatMessage::assistant(
                    "Here's my reasoning process:\nab\n\nBased on this reasoning, I will now provide my response:"
                ),
            ]
        );
        // Input untouched
        assert_eq!(input.len(), 5);
    }

    #[test]
    fn test_usable_reasoning() {
        assert_eq!(usable_reasoning(Ok("x".into())).unwrap(), "x");
        assert!(matches!(
            usable_reasoning(Ok(String::new())),
            Err(DeepClaudeError::EmptyReasoning)
        ));

        let (tx, rx) = oneshot::channel::<String>();
        drop(tx);
        let closed = futures::executor::block_on(rx);
        assert!(matches!(usable_reasoning(closed), Err(DeepClaudeError::EmptyReasoning)));
    }

    #[test]
    fn test_stage_output_marks_once_on_drop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = StageOutput::new(Stage::Answer, tx);
        let identity = RequestIdentity {
            id: "chatcmpl-x".into(),
            created: 0,
        };
        output.emit(ProtocolChunk::answer(&identity, "m", "hi")).unwrap();
        drop(output);

        assert!(matches!(rx.try_recv(), Ok(MergeItem::Chunk(_))));
        assert_eq!(rx.try_recv().unwrap(), MergeItem::StageFinished(Stage::Answer));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_sequencer_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let output = StageOutput::new(Stage::Reasoning, tx);
        let identity = RequestIdentity {
            id: "chatcmpl-y".into(),
            created: 0,
        };
        assert!(matches!(
            output.emit(ProtocolChunk::reasoning(&identity, "m", "t")),
            Err(DeepClaudeError::Cancelled)
        ));
    }
}
