//! Merge/termination sequencer
//!
//! Both stages write into one unbounded channel. Each stage closes its side
//! with a `StageFinished` marker; the sequencer forwards everything else in
//! arrival order and appends the terminal sentinel only after counting both
//! markers (or after every writer is gone).

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::chunk::{OutboundFrame, ProtocolChunk};

/// Number of stages that must report before the stream closes
pub const STAGE_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reasoning,
    Answer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reasoning => f.write_str("reasoning"),
            Stage::Answer => f.write_str("answer"),
        }
    }
}

/// Item on the shared merge channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeItem {
    Chunk(ProtocolChunk),
    StageFinished(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    AwaitingChunks { finished: usize },
    Closing,
    Closed,
}

/// Reads the merge channel and produces the outbound frames
pub struct MergeSequencer {
    rx: mpsc::UnboundedReceiver<MergeItem>,
    state: SequencerState,
    request_id: String,
}

impl MergeSequencer {
    pub fn new(rx: mpsc::UnboundedReceiver<MergeItem>, request_id: impl Into<String>) -> Self {
        Self {
            rx,
            state: SequencerState::AwaitingChunks { finished: 0 },
            request_id: request_id.into(),
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Next outbound frame, or `None` once the sentinel has been handed out
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        loop {
            match self.state {
                SequencerState::Closed => return None,
                SequencerState::Closing => {
                    self.state = SequencerState::Closed;
                    debug!(request_id = %self.request_id, "merged stream closed");
                    return Some(OutboundFrame::Done);
                }
                SequencerState::AwaitingChunks { finished } => match self.rx.recv().await {
                    Some(MergeItem::Chunk(chunk)) => return Some(OutboundFrame::Chunk(chunk)),
                    Some(MergeItem::StageFinished(stage)) => {
                        let finished = finished + 1;
                        debug!(
                            request_id = %self.request_id,
                            %stage,
                            finished,
                            "stage finished"
                        );
                        self.state = if finished >= STAGE_COUNT {
                            SequencerState::Closing
                        } else {
                            SequencerState::AwaitingChunks { finished }
                        };
                    }
                    None => {
                        // Every writer is gone; nothing more can arrive
                        warn!(
                            request_id = %self.request_id,
                            finished,
                            "merge channel closed before all stages reported"
                        );
                        self.state = SequencerState::Closing;
                    }
                },
            }
        }
    }
}
