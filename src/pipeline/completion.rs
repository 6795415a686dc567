//! Non-streaming response, folded from the merged frames

use serde::{Deserialize, Serialize};

use super::chunk::{OutboundFrame, RequestIdentity};
use crate::provider::ROLE_ASSISTANT;

pub const COMPLETION_OBJECT: &str = "chat.completion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    pub content: String,
}

impl ChatCompletion {
    /// Concatenate reasoning and answer text from every chunk
    pub fn from_frames(
        identity: &RequestIdentity,
        model: &str,
        frames: impl IntoIterator<Item = OutboundFrame>,
    ) -> Self {
        let mut reasoning = String::new();
        let mut content = String::new();

        for frame in frames {
            let OutboundFrame::Chunk(chunk) = frame else {
                break;
            };
            if let Some(delta) = chunk.delta() {
                if let Some(r) = &delta.reasoning_content {
                    reasoning.push_str(r);
                }
                content.push_str(&delta.content);
            }
        }

        Self {
            id: identity.id.clone(),
            object: COMPLETION_OBJECT.to_string(),
            created: identity.created,
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: ROLE_ASSISTANT.to_string(),
                    reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
        }
    }
}
