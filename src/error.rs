// src/error.rs
// Error types for the relay and its upstream clients

use thiserror::Error;

/// Main error type for the deepclaude library
#[derive(Error, Debug)]
pub enum DeepClaudeError {
    /// Upstream produced a fault in the middle of a stream
    #[error("{provider} upstream error: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    /// Upstream rejected the request outright
    #[error("{provider} API error {status}: {body}")]
    UpstreamStatus {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An SSE frame did not have the shape the client expected
    #[error("malformed upstream event: {0}")]
    MalformedEvent(String),

    /// Reasoning stage delivered nothing usable
    #[error("no reasoning text was delivered")]
    EmptyReasoning,

    #[error("stream cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience type alias for Result using DeepClaudeError
pub type Result<T> = std::result::Result<T, DeepClaudeError>;

impl DeepClaudeError {
    /// Shorthand for a mid-stream upstream fault
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        DeepClaudeError::Upstream {
            provider,
            message: message.into(),
        }
    }
}
