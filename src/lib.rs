//! DeepClaude: streams a reasoning model's thinking into an answer model and
//! serves both as one OpenAI-style chunk stream.

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod server;

pub use config::{FileConfig, Settings};
pub use error::{DeepClaudeError, Result};
pub use pipeline::{ChainRequest, ChainStream, DeepClaude, OutboundFrame};
