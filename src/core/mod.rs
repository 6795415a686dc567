//! Core primitives shared by the upstream clients

pub mod streaming;

pub use streaming::{SseDecoder, SseFrame};
