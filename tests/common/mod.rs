// tests/common/mod.rs
// Scripted in-memory upstream sources for relay tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use deepclaude::error::{DeepClaudeError, Result};
use deepclaude::pipeline::{ChainRequest, OutboundFrame, ProtocolChunk};
use deepclaude::provider::{
    AnswerSource, ChatMessage, EVENT_CHANNEL_CAPACITY, EventReceiver, ReasoningSource, StreamEvent,
};

/// One scripted upstream item
#[derive(Debug, Clone)]
pub enum Step {
    Event(StreamEvent),
    Fault(String),
}

pub fn reasoning(text: &str) -> Step {
    Step::Event(StreamEvent::Reasoning(text.into()))
}

pub fn content(text: &str) -> Step {
    Step::Event(StreamEvent::Content(text.into()))
}

pub fn answer(text: &str) -> Step {
    Step::Event(StreamEvent::Answer(text.into()))
}

pub fn fault(message: &str) -> Step {
    Step::Fault(message.into())
}

fn play(steps: &[Step]) -> EventReceiver {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    for step in steps {
        let item = match step {
            Step::Event(event) => Ok(event.clone()),
            Step::Fault(message) => Err(DeepClaudeError::upstream("scripted", message.clone())),
        };
        tx.try_send(item).expect("script fits the channel");
    }
    rx
}

/// Plays a fixed script; optionally refuses to connect
#[derive(Default)]
pub struct ScriptedReasoner {
    pub steps: Vec<Step>,
    pub refuse: bool,
    pub calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            ..Default::default()
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl ReasoningSource for ScriptedReasoner {
    fn name(&self) -> &'static str {
        "scripted-reasoner"
    }

    async fn stream_reasoning(
        &self,
        _messages: Vec<ChatMessage>,
        _model: &str,
        _origin_reasoning: bool,
    ) -> Result<EventReceiver> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(DeepClaudeError::upstream("scripted-reasoner", "connection refused"));
        }
        Ok(play(&self.steps))
    }
}

/// Plays a fixed script and records every history it was given
#[derive(Default)]
pub struct RecordingAnswerer {
    pub steps: Vec<Step>,
    pub histories: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingAnswerer {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            ..Default::default()
        })
    }

    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.histories.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerSource for RecordingAnswerer {
    fn name(&self) -> &'static str {
        "recording-answerer"
    }

    async fn stream_answer(&self, messages: Vec<ChatMessage>, _model: &str) -> Result<EventReceiver> {
        self.histories.lock().unwrap().push(messages);
        Ok(play(&self.steps))
    }
}

/// Answers by echoing the reasoning preamble it received, one word per fragment
pub struct EchoAnswerer;

#[async_trait]
impl AnswerSource for EchoAnswerer {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn stream_answer(&self, messages: Vec<ChatMessage>, _model: &str) -> Result<EventReceiver> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let steps: Vec<Step> = last.split(' ').map(answer).collect();
        Ok(play(&steps))
    }
}

/// Thinks by spelling out the last user message one character per fragment,
/// yielding between fragments so concurrent requests interleave
pub struct SpellingReasoner;

#[async_trait]
impl ReasoningSource for SpellingReasoner {
    fn name(&self) -> &'static str {
        "spelling"
    }

    async fn stream_reasoning(
        &self,
        messages: Vec<ChatMessage>,
        _model: &str,
        _origin_reasoning: bool,
    ) -> Result<EventReceiver> {
        let word = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for c in word.chars() {
                if tx.send(Ok(StreamEvent::Reasoning(c.to_string()))).await.is_err() {
                    return;
                }
                tokio::task::yield_now().await;
            }
            let _ = tx.send(Ok(StreamEvent::Content(String::new()))).await;
        });
        Ok(rx)
    }
}

/// Sends its opening events, then holds the stream open until the consumer
/// drops it; `released` flips once that happens
pub struct HangingSource {
    pub opening: Vec<StreamEvent>,
    pub released: Arc<AtomicBool>,
}

impl HangingSource {
    pub fn new(opening: Vec<StreamEvent>) -> Arc<Self> {
        Arc::new(Self {
            opening,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    fn open(&self) -> EventReceiver {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let opening = self.opening.clone();
        let released = Arc::clone(&self.released);
        tokio::spawn(async move {
            for event in opening {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            tx.closed().await;
            released.store(true, Ordering::SeqCst);
        });
        rx
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningSource for HangingSource {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn stream_reasoning(
        &self,
        _messages: Vec<ChatMessage>,
        _model: &str,
        _origin_reasoning: bool,
    ) -> Result<EventReceiver> {
        Ok(self.open())
    }
}

#[async_trait]
impl AnswerSource for HangingSource {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn stream_answer(&self, _messages: Vec<ChatMessage>, _model: &str) -> Result<EventReceiver> {
        Ok(self.open())
    }
}

pub fn request(messages: Vec<ChatMessage>) -> ChainRequest {
    ChainRequest {
        messages,
        reasoning_model: "deepseek-reasoner".into(),
        answer_model: "claude-3-5-sonnet-20241022".into(),
        origin_reasoning: true,
    }
}

pub fn chunks(frames: &[OutboundFrame]) -> Vec<&ProtocolChunk> {
    frames
        .iter()
        .filter_map(|f| match f {
            OutboundFrame::Chunk(c) => Some(c),
            OutboundFrame::Done => None,
        })
        .collect()
}

pub fn reasoning_texts(frames: &[OutboundFrame]) -> Vec<String> {
    chunks(frames)
        .into_iter()
        .filter_map(|c| c.delta().and_then(|d| d.reasoning_content.clone()))
        .collect()
}

pub fn answer_texts(frames: &[OutboundFrame]) -> Vec<String> {
    chunks(frames)
        .into_iter()
        .filter_map(|c| c.delta())
        .filter(|d| d.reasoning_content.is_none())
        .map(|d| d.content.clone())
        .collect()
}
