//! DeepClaude - DeepSeek reasoning chained into Claude answers
//!
//! Runs as an OpenAI-compatible HTTP server, or answers a single prompt
//! from the command line.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use tracing_subscriber::{EnvFilter, fmt};

use deepclaude::config::{DEFAULT_LOG_LEVEL, FileConfig, Settings};
use deepclaude::pipeline::{ChainRequest, DeepClaude, OutboundFrame};
use deepclaude::provider::ChatMessage;

#[derive(Parser)]
#[command(name = "deepclaude")]
#[command(about = "Stream DeepSeek reasoning into Claude answers", version)]
struct Cli {
    #[command(flatten)]
    upstream: UpstreamArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct UpstreamArgs {
    /// DeepSeek API key
    #[arg(long, global = true, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    deepseek_api_key: Option<String>,

    /// DeepSeek chat completions endpoint
    #[arg(long, global = true, env = "DEEPSEEK_API_URL")]
    deepseek_api_url: Option<String>,

    /// Reasoning model
    #[arg(long, global = true, env = "DEEPSEEK_MODEL")]
    deepseek_model: Option<String>,

    /// Claude API key
    #[arg(long, global = true, env = "CLAUDE_API_KEY", hide_env_values = true)]
    claude_api_key: Option<String>,

    /// Claude endpoint (defaults depend on the provider)
    #[arg(long, global = true, env = "CLAUDE_API_URL")]
    claude_api_url: Option<String>,

    /// anthropic, openrouter or oneapi
    #[arg(long, global = true, env = "CLAUDE_PROVIDER")]
    claude_provider: Option<String>,

    /// Answer model
    #[arg(long, global = true, env = "CLAUDE_MODEL")]
    claude_model: Option<String>,

    /// true: reasoning in `reasoning_content`; false: inside <think> tags
    #[arg(long, global = true, env = "IS_ORIGIN_REASONING")]
    is_origin_reasoning: Option<bool>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "HOST")]
        host: Option<String>,

        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Allowed CORS origins, comma separated (default: any)
        #[arg(long, env = "ALLOW_ORIGINS", value_delimiter = ',')]
        allow_origins: Option<Vec<String>>,
    },
    /// Answer one prompt, streaming reasoning to stderr and the answer to stdout
    Ask {
        prompt: String,

        /// Optional system message
        #[arg(long)]
        system: Option<String>,
    },
}

impl Cli {
    /// CLI flags and env vars as the top configuration layer
    fn layer(&self) -> FileConfig {
        let u = &self.upstream;
        let mut layer = FileConfig {
            deepseek_api_key: u.deepseek_api_key.clone(),
            deepseek_api_url: u.deepseek_api_url.clone(),
            deepseek_model: u.deepseek_model.clone(),
            claude_api_key: u.claude_api_key.clone(),
            claude_api_url: u.claude_api_url.clone(),
            claude_provider: u.claude_provider.clone(),
            claude_model: u.claude_model.clone(),
            is_origin_reasoning: u.is_origin_reasoning,
            log_level: u.log_level.clone(),
            ..Default::default()
        };
        if let Command::Serve {
            host,
            port,
            allow_origins,
        } = &self.command
        {
            layer.host = host.clone();
            layer.port = *port;
            layer.allow_origins = allow_origins.clone();
        }
        layer
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from ~/.deepclaude/.env or current dir)
    let env_path = dirs::home_dir()
        .map(|h| h.join(".deepclaude").join(".env"))
        .filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    let cli = Cli::parse();

    // Resolve values: CLI args > env vars (handled by clap) > config file > defaults
    let config = cli.layer().or(FileConfig::load());

    let level = config
        .log_level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::resolve(config)?;
    tracing::debug!(
        deepseek_model = %settings.deepseek_model,
        claude_model = %settings.claude_model,
        claude_provider = %settings.claude_provider,
        origin_reasoning = settings.is_origin_reasoning,
        "settings resolved"
    );

    match cli.command {
        Command::Serve { .. } => deepclaude::server::run(settings).await,
        Command::Ask { prompt, system } => ask(&settings, prompt, system).await,
    }
}

async fn ask(settings: &Settings, prompt: String, system: Option<String>) -> Result<()> {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    let relay = DeepClaude::from_settings(settings);
    let mut stream = relay.stream(ChainRequest::from_settings(messages, settings));

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let mut in_reasoning = false;

    while let Some(frame) = stream.next().await {
        let OutboundFrame::Chunk(chunk) = frame else {
            break;
        };
        let Some(delta) = chunk.delta() else {
            continue;
        };
        match &delta.reasoning_content {
            Some(reasoning) => {
                write!(stderr, "\x1b[2m{}\x1b[0m", reasoning)?;
                stderr.flush()?;
                in_reasoning = true;
            }
            None => {
                if in_reasoning {
                    writeln!(stderr)?;
                    in_reasoning = false;
                }
                write!(stdout, "{}", delta.content)?;
                stdout.flush()?;
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}
