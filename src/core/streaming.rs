//! SSE (Server-Sent Events) decoding for upstream model streams
//!
//! Both upstream clients read `text/event-stream` bodies through this decoder.

use serde::de::DeserializeOwned;

use crate::error::{DeepClaudeError, Result};

// ============================================================================
// SSE Decoder
// ============================================================================

/// SSE stream decoder with buffering
///
/// Handles partial chunks and extracts complete `data:` frames.
/// `event:`, `id:` and `retry:` lines are skipped; the JSON payloads of
/// both upstream APIs carry their own type tags.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Maximum buffer size (1MB)
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Push a chunk of bytes and extract complete SSE frames
    ///
    /// Incomplete trailing data stays buffered for the next push. Lines are
    /// decoded only once complete, so multi-byte characters split across
    /// network chunks survive intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!(
                "SSE buffer exceeded {}KB limit, truncating",
                Self::MAX_BUFFER_SIZE / 1024
            );
            let keep_from = self.buffer.len() - (Self::MAX_BUFFER_SIZE / 2);
            self.buffer.drain(..keep_from);
        }

        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                frames.push(SseFrame {
                    data: data.trim_start().to_string(),
                });
            }
        }

        frames
    }

    /// Push a string directly (for testing or pre-decoded content)
    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    /// Check if there's remaining buffered data
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }
}

// ============================================================================
// SSE Frame
// ============================================================================

/// A complete SSE frame (data line)
#[derive(Debug, Clone)]
pub struct SseFrame {
    /// The data content (without "data:" prefix)
    pub data: String,
}

impl SseFrame {
    /// Check if this is the [DONE] sentinel
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    /// Parse the frame data as JSON
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| {
            DeepClaudeError::MalformedEvent(format!("{}. Data: {}", e, self.preview()))
        })
    }

    /// Get a preview of the data (first 200 chars) for error messages
    pub fn preview(&self) -> String {
        if self.data.chars().count() > 200 {
            let head: String = self.data.chars().take(200).collect();
            format!("{}...", head)
        } else {
            self.data.clone()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
