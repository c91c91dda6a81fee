use std::path::PathBuf;
use std::time::Duration;

use chatrelay_core::budget::{DEFAULT_PORTION_SIZE, DEFAULT_TOKEN_BUDGET};
use chatrelay_loop::config::DEFAULT_RATE_LIMIT_FALLBACK;
use chatrelay_store::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_FEED_POLL_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// OpenAI-compatible streaming endpoint
    #[value(name = "openai")]
    OpenAI,
    /// Scripted echo backend, no network access
    Offline,
}

/// Runtime configuration, gathered once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_address: String,
    pub provider: ProviderKind,
    pub llm_base_url: String,
    pub model: String,
    pub api_key: String,
    pub token_budget: u32,
    pub portion_size: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub feed_poll_interval: Duration,
    pub data_dir: PathBuf,
    pub rate_limit_fallback: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            provider: ProviderKind::OpenAI,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            portion_size: DEFAULT_PORTION_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            feed_poll_interval: DEFAULT_FEED_POLL_INTERVAL,
            data_dir: default_data_dir(),
            rate_limit_fallback: DEFAULT_RATE_LIMIT_FALLBACK.to_string(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".chatrelay")
}
