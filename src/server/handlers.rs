//! HTTP handlers for the relay endpoints

use axum::{
    extract::State,
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use tracing::info;

use super::AppState;
use super::types::{ChatCompletionRequest, ModelList};
use crate::pipeline::{ChainRequest, OutboundFrame};

/// Health check
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn models_handler() -> Json<ModelList> {
    Json(ModelList::relay())
}

/// POST /v1/chat/completions
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Response {
    info!(
        messages = req.messages.len(),
        stream = req.stream,
        requested_model = req.model.as_deref().unwrap_or("-"),
        "chat completion request"
    );

    let chain = ChainRequest::from_settings(req.messages, &state.settings);

    if !req.stream {
        return Json(state.relay.complete(chain).await).into_response();
    }

    // Dropping this stream (client disconnect) cancels both stages
    let stream = state.relay.stream(chain).map(|frame| {
        let event = match frame {
            OutboundFrame::Chunk(chunk) => {
                Event::default().data(serde_json::to_string(&chunk).unwrap_or_default())
            }
            OutboundFrame::Done => Event::default().data("[DONE]"),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
