//! Outbound protocol chunks
//!
//! The merged stream speaks the OpenAI `chat.completion.chunk` format, one
//! `data: ` line per fragment, closed by a literal `data: [DONE]` line.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::ROLE_ASSISTANT;

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Final line of every outbound stream
pub const TERMINAL_SENTINEL: &str = "data: [DONE]\n\n";

/// Correlation id and creation time, fixed for the whole request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub id: String,
    /// Unix epoch seconds
    pub created: i64,
}

impl RequestIdentity {
    /// `chatcmpl-<hex millis><8 random hex>`; the random tail keeps two
    /// requests started in the same millisecond apart.
    pub fn generate() -> Self {
        let now = Utc::now();
        let tail = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("chatcmpl-{:x}{}", now.timestamp_millis(), &tail[..8]),
            created: now.timestamp(),
        }
    }
}

/// One outbound `chat.completion.chunk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    pub content: String,
}

impl ProtocolChunk {
    fn new(identity: &RequestIdentity, model: &str, delta: ChunkDelta) -> Self {
        Self {
            id: identity.id.clone(),
            object: CHUNK_OBJECT.to_string(),
            created: identity.created,
            model: model.to_string(),
            choices: vec![ChunkChoice { index: 0, delta }],
        }
    }

    /// Thinking fragment: reasoning field set, content empty
    pub fn reasoning(identity: &RequestIdentity, model: &str, text: impl Into<String>) -> Self {
        Self::new(
            identity,
            model,
            ChunkDelta {
                role: ROLE_ASSISTANT.to_string(),
                reasoning_content: Some(text.into()),
                content: String::new(),
            },
        )
    }

    /// Answer fragment: content set, no reasoning field
    pub fn answer(identity: &RequestIdentity, model: &str, text: impl Into<String>) -> Self {
        Self::new(
            identity,
            model,
            ChunkDelta {
                role: ROLE_ASSISTANT.to_string(),
                reasoning_content: None,
                content: text.into(),
            },
        )
    }

    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|c| &c.delta)
    }

    /// `data: {json}\n\n`
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }
}

/// One element of the merged outbound sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Chunk(ProtocolChunk),
    /// Terminal sentinel; always the last frame
    Done,
}

impl OutboundFrame {
    pub fn is_done(&self) -> bool {
        matches!(self, OutboundFrame::Done)
    }

    pub fn to_sse(&self) -> String {
        match self {
            OutboundFrame::Chunk(chunk) => chunk.to_sse(),
            OutboundFrame::Done => TERMINAL_SENTINEL.to_string(),
        }
    }
}
