// src/pipeline/mod.rs
// Stage coordinator: runs the reasoning and answer stages concurrently and
// exposes their merged output as one stream

pub mod chunk;
pub mod completion;
pub mod sequencer;
pub mod stages;

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::config::Settings;
use crate::provider::{AnswerSource, ChatMessage, ClaudeClient, DeepSeekClient, ReasoningSource};

pub use chunk::{OutboundFrame, ProtocolChunk, RequestIdentity, TERMINAL_SENTINEL};
pub use completion::ChatCompletion;
pub use sequencer::{MergeItem, MergeSequencer, SequencerState, Stage};
pub use stages::{REASONING_PLACEHOLDER, build_answer_history, reasoning_preamble};

use stages::{AnswerStage, ReasoningStage, StageOutput};

/// Everything one relayed request needs
#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub messages: Vec<ChatMessage>,
    pub reasoning_model: String,
    pub answer_model: String,
    /// Where the reasoning source puts its thinking (field vs. `<think>` tags)
    pub origin_reasoning: bool,
}

impl ChainRequest {
    /// Request using the configured models and mode
    pub fn from_settings(messages: Vec<ChatMessage>, settings: &Settings) -> Self {
        Self {
            messages,
            reasoning_model: settings.deepseek_model.clone(),
            answer_model: settings.claude_model.clone(),
            origin_reasoning: settings.is_origin_reasoning,
        }
    }
}

/// Merged outbound frames; always ends with `OutboundFrame::Done`
pub type ChainStream = BoxStream<'static, OutboundFrame>;

/// Chains a reasoning source into an answer source.
///
/// Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct DeepClaude {
    reasoner: Arc<dyn ReasoningSource>,
    answerer: Arc<dyn AnswerSource>,
}

impl DeepClaude {
    pub fn new(reasoner: Arc<dyn ReasoningSource>, answerer: Arc<dyn AnswerSource>) -> Self {
        Self { reasoner, answerer }
    }

    /// Build the DeepSeek and Claude clients from resolved settings
    pub fn from_settings(settings: &Settings) -> Self {
        let reasoner = DeepSeekClient::new(&settings.deepseek_api_key, &settings.deepseek_api_url);
        let answerer = ClaudeClient::new(
            &settings.claude_api_key,
            &settings.claude_api_url,
            settings.claude_provider,
        )
        .with_max_tokens(settings.claude_max_tokens);
        Self::new(Arc::new(reasoner), Arc::new(answerer))
    }

    /// Start both stages and return the merged stream
    pub fn stream(&self, request: ChainRequest) -> ChainStream {
        self.stream_with_identity(request, RequestIdentity::generate())
    }

    /// Same as [`stream`](Self::stream) with a caller-chosen identity.
    ///
    /// Dropping the returned stream cancels both stages, which in turn drops
    /// their upstream receivers and closes the HTTP connections.
    pub fn stream_with_identity(
        &self,
        request: ChainRequest,
        identity: RequestIdentity,
    ) -> ChainStream {
        let ChainRequest {
            messages,
            reasoning_model,
            answer_model,
            origin_reasoning,
        } = request;

        info!(
            request_id = %identity.id,
            reasoning_model = %reasoning_model,
            answer_model = %answer_model,
            origin_reasoning,
            messages = messages.len(),
            "starting relay"
        );

        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        let (handoff_tx, handoff_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let span = info_span!("relay", request_id = %identity.id);

        let reasoning = ReasoningStage {
            source: Arc::clone(&self.reasoner),
            messages: messages.clone(),
            model: reasoning_model,
            origin_reasoning,
            identity: identity.clone(),
            output: StageOutput::new(Stage::Reasoning, merge_tx.clone()),
            cancel: cancel.clone(),
        };
        let answer = AnswerStage {
            source: Arc::clone(&self.answerer),
            messages,
            model: answer_model,
            identity: identity.clone(),
            output: StageOutput::new(Stage::Answer, merge_tx),
            cancel: cancel.clone(),
        };

        tokio::spawn(reasoning.run(handoff_tx).instrument(span.clone()));
        tokio::spawn(answer.run(handoff_rx).instrument(span));

        let mut sequencer = MergeSequencer::new(merge_rx, identity.id);
        let guard = cancel.drop_guard();

        async_stream::stream! {
            let _guard = guard;
            while let Some(frame) = sequencer.next_frame().await {
                yield frame;
            }
        }
        .boxed()
    }

    /// Run a request to completion and fold it into one response
    pub async fn complete(&self, request: ChainRequest) -> ChatCompletion {
        let identity = RequestIdentity::generate();
        let model = request.answer_model.clone();
        let frames: Vec<OutboundFrame> = self
            .stream_with_identity(request, identity.clone())
            .collect()
            .await;
        ChatCompletion::from_frames(&identity, &model, frames)
    }
}
