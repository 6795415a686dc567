//! `<think>` tag parsing for reasoning models that inline their thoughts
//!
//! Some deployments of reasoning models do not expose a separate
//! `reasoning_content` field and instead wrap the thinking in
//! `<think>...</think>` inside ordinary content. This parser splits such a
//! content stream into reasoning fragments and a content marker.

use super::StreamEvent;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThinkState {
    /// No tag seen yet
    BeforeThink,
    /// Inside a thinking block, looking for </think>
    Thinking,
    /// Thinking finished; everything is content
    AfterThink,
}

/// Incremental splitter for `<think>`-tagged content
#[derive(Debug)]
pub struct ThinkTagParser {
    state: ThinkState,
    buffer: String,
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self {
            state: ThinkState::BeforeThink,
            buffer: String::new(),
        }
    }

    /// Feed one content delta, returning the events it completes.
    ///
    /// A `Content` event is emitted as soon as `</think>` is seen, even if
    /// no text follows it in the same delta.
    pub fn push(&mut self, text: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(text);
        let mut events = Vec::new();

        loop {
            match self.state {
                ThinkState::BeforeThink => {
                    if let Some(pos) = self.buffer.find(OPEN_TAG) {
                        // Text leading into the tag belongs to the thinking
                        let before: String = self.buffer.drain(..pos).collect();
                        if !before.trim().is_empty() {
                            events.push(StreamEvent::Reasoning(before));
                        }
                        self.buffer.drain(..OPEN_TAG.len());
                        self.state = ThinkState::Thinking;
                    } else {
                        let ready = self.take_ready(OPEN_TAG);
                        // Whitespace before the tag is noise; anything else
                        // means the model is answering without thinking
                        if !ready.trim().is_empty() {
                            events.push(StreamEvent::Content(ready));
                            self.state = ThinkState::AfterThink;
                        }
                        break;
                    }
                }
                ThinkState::Thinking => {
                    if let Some(pos) = self.buffer.find(CLOSE_TAG) {
                        let thought: String = self.buffer.drain(..pos).collect();
                        if !thought.is_empty() {
                            events.push(StreamEvent::Reasoning(thought));
                        }
                        self.buffer.drain(..CLOSE_TAG.len());
                        self.state = ThinkState::AfterThink;
                        events.push(StreamEvent::Content(std::mem::take(&mut self.buffer)));
                        break;
                    } else {
                        let ready = self.take_ready(CLOSE_TAG);
                        if !ready.is_empty() {
                            events.push(StreamEvent::Reasoning(ready));
                        }
                        break;
                    }
                }
                ThinkState::AfterThink => {
                    let rest = std::mem::take(&mut self.buffer);
                    if !rest.is_empty() {
                        events.push(StreamEvent::Content(rest));
                    }
                    break;
                }
            }
        }

        events
    }

    /// Flush whatever is still buffered when the stream ends
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        match self.state {
            ThinkState::Thinking if !rest.is_empty() => vec![StreamEvent::Reasoning(rest)],
            ThinkState::BeforeThink if !rest.trim().is_empty() => {
                vec![StreamEvent::Content(rest)]
            }
            ThinkState::AfterThink if !rest.is_empty() => vec![StreamEvent::Content(rest)],
            _ => Vec::new(),
        }
    }

    /// Drain the buffer except for a trailing partial `tag`
    fn take_ready(&mut self, tag: &str) -> String {
        let hold = partial_tag_len(&self.buffer, tag);
        let end = self.buffer.len() - hold;
        self.buffer.drain(..end).collect()
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of `tag`
fn partial_tag_len(buf: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&len| buf.ends_with(&tag[..len]))
        .unwrap_or(0)
}
