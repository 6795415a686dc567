//! Request/response types for the OpenAI-compatible endpoints

use serde::{Deserialize, Serialize};

use crate::provider::ChatMessage;

/// Model id the relay advertises
pub const RELAY_MODEL_ID: &str = "deepclaude";

/// Body of POST /v1/chat/completions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Defaults to false, as in the OpenAI API
    #[serde(default)]
    pub stream: bool,
    /// Accepted for compatibility; the configured models are always used
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelList {
    pub fn relay() -> Self {
        Self {
            object: "list".to_string(),
            data: vec![ModelEntry {
                id: RELAY_MODEL_ID.to_string(),
                object: "model".to_string(),
                created: 1_737_936_000,
                owned_by: RELAY_MODEL_ID.to_string(),
            }],
        }
    }
}
