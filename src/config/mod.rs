//! Configuration file support for deepclaude
//!
//! Loads optional values from ~/.deepclaude/config.toml. Command-line flags and
//! environment variables (both handled by clap) take precedence; whatever is
//! still unset falls back to the built-in defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{DeepClaudeError, Result};
use crate::provider::ClaudeProvider;
use crate::provider::claude::{ANTHROPIC_API_URL, DEFAULT_MAX_TOKENS};
use crate::provider::deepseek::DEEPSEEK_API_URL;

pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-reasoner";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// One configuration layer. Every field is optional so layers can be stacked.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub deepseek_api_key: Option<String>,
    pub deepseek_api_url: Option<String>,
    pub deepseek_model: Option<String>,

    pub claude_api_key: Option<String>,
    pub claude_api_url: Option<String>,
    /// anthropic, openrouter or oneapi
    pub claude_provider: Option<String>,
    pub claude_model: Option<String>,
    pub claude_max_tokens: Option<u32>,

    /// true: thinking arrives in `reasoning_content`; false: inside `<think>` tags
    pub is_origin_reasoning: Option<bool>,

    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    /// CORS origins; empty or absent allows any
    pub allow_origins: Option<Vec<String>>,
}

impl FileConfig {
    /// Load config from ~/.deepclaude/config.toml
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load from an explicit path; a missing or broken file yields the empty layer
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Fill every unset field of `self` from `lower`
    pub fn or(self, lower: FileConfig) -> FileConfig {
        FileConfig {
            deepseek_api_key: self.deepseek_api_key.or(lower.deepseek_api_key),
            deepseek_api_url: self.deepseek_api_url.or(lower.deepseek_api_url),
            deepseek_model: self.deepseek_model.or(lower.deepseek_model),
            claude_api_key: self.claude_api_key.or(lower.claude_api_key),
            claude_api_url: self.claude_api_url.or(lower.claude_api_url),
            claude_provider: self.claude_provider.or(lower.claude_provider),
            claude_model: self.claude_model.or(lower.claude_model),
            claude_max_tokens: self.claude_max_tokens.or(lower.claude_max_tokens),
            is_origin_reasoning: self.is_origin_reasoning.or(lower.is_origin_reasoning),
            host: self.host.or(lower.host),
            port: self.port.or(lower.port),
            log_level: self.log_level.or(lower.log_level),
            allow_origins: self.allow_origins.or(lower.allow_origins),
        }
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".deepclaude")
        .join("config.toml")
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub deepseek_api_key: String,
    pub deepseek_api_url: String,
    pub deepseek_model: String,
    pub claude_api_key: String,
    pub claude_api_url: String,
    pub claude_provider: ClaudeProvider,
    pub claude_model: String,
    pub claude_max_tokens: u32,
    pub is_origin_reasoning: bool,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub allow_origins: Vec<String>,
}

impl Settings {
    /// Apply defaults to a merged layer. Missing API keys are an error.
    pub fn resolve(config: FileConfig) -> Result<Self> {
        let deepseek_api_key = require(config.deepseek_api_key, "deepseek_api_key")?;
        let claude_api_key = require(config.claude_api_key, "claude_api_key")?;

        let claude_provider = match config.claude_provider.as_deref() {
            Some(name) => name.parse()?,
            None => ClaudeProvider::default(),
        };
        let claude_api_url = match (config.claude_api_url, claude_provider) {
            (Some(url), _) => url,
            (None, ClaudeProvider::Anthropic) => ANTHROPIC_API_URL.to_string(),
            (None, ClaudeProvider::OpenRouter) => OPENROUTER_API_URL.to_string(),
            (None, ClaudeProvider::OneApi) => {
                return Err(DeepClaudeError::Config(
                    "claude_api_url is required for the oneapi provider".into(),
                ));
            }
        };

        Ok(Self {
            deepseek_api_key,
            deepseek_api_url: config
                .deepseek_api_url
                .unwrap_or_else(|| DEEPSEEK_API_URL.to_string()),
            deepseek_model: config
                .deepseek_model
                .unwrap_or_else(|| DEFAULT_DEEPSEEK_MODEL.to_string()),
            claude_api_key,
            claude_api_url,
            claude_provider,
            claude_model: config
                .claude_model
                .unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            claude_max_tokens: config.claude_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            is_origin_reasoning: config.is_origin_reasoning.unwrap_or(true),
            host: config.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: config.port.unwrap_or(DEFAULT_PORT),
            log_level: config
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            allow_origins: config.allow_origins.unwrap_or_default(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn require(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DeepClaudeError::Config(format!("{} is not set", name)))
}
