use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use chatrelay_server::config::{default_data_dir, ProviderKind, ServerConfig};
use chatrelay_server::logging::init_logging;
use chatrelay_server::run_server;

#[derive(Parser, Debug, Clone)]
#[command(name = "chatrelay-server")]
#[command(about = "Conversational session and streaming coordinator")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8081")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1")]
    bind_address: String,

    /// LLM provider (openai or offline)
    #[arg(long, env = "LLM_PROVIDER", default_value = "openai")]
    provider: ProviderKind,

    /// LLM API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    llm_base_url: String,

    /// LLM model name
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// LLM API key
    #[arg(long, env = "LLM_API_KEY", default_value = "")]
    api_key: String,

    /// Prompt token budget per turn
    #[arg(long, env = "TOKEN_BUDGET", default_value = "8000")]
    token_budget: u32,

    /// Messages folded into each summary portion
    #[arg(long, env = "SUMMARY_PORTION_SIZE", default_value = "30")]
    portion_size: usize,

    /// Session cache entry lifetime in seconds
    #[arg(long, env = "SESSION_CACHE_TTL_SECS", default_value = "600")]
    cache_ttl_secs: u64,

    /// Maximum number of users held in the session cache
    #[arg(long, env = "SESSION_CACHE_CAPACITY", default_value = "1024")]
    cache_capacity: usize,

    /// Poll interval of the SSE feeds in milliseconds
    #[arg(long, env = "FEED_POLL_INTERVAL_MS", default_value = "1500")]
    feed_poll_interval_ms: u64,

    /// Directory holding durable session files
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Reply sent when the backend is rate limited
    #[arg(long, env = "RATE_LIMIT_FALLBACK")]
    rate_limit_fallback: Option<String>,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            port: self.port,
            bind_address: self.bind_address,
            provider: self.provider,
            llm_base_url: self.llm_base_url,
            model: self.model,
            api_key: self.api_key,
            token_budget: self.token_budget,
            portion_size: self.portion_size,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_capacity: self.cache_capacity,
            feed_poll_interval: Duration::from_millis(self.feed_poll_interval_ms),
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            rate_limit_fallback: self
                .rate_limit_fallback
                .unwrap_or(defaults.rate_limit_fallback),
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.log_level.as_deref());

    log::info!("Starting chatrelay server on port {}", cli.port);
    log::info!("LLM Configuration:");
    log::info!("  Provider: {:?}", cli.provider);
    log::info!("  Base URL: {}", cli.llm_base_url);
    log::info!("  Model: {}", cli.model);

    if cli.provider == ProviderKind::OpenAI && cli.api_key.is_empty() {
        log::warn!("LLM_API_KEY is empty; backend requests will likely be rejected");
    }

    let config = cli.into_config();

    run_server(config).await
}
