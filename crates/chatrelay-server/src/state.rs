use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::{
    HeuristicSummarizer, HeuristicTokenCounter, PlannerLimits, Summarizer, TokenBudgetPlanner,
};
use chatrelay_llm::{BackendSummarizer, LLMProvider, OpenAIProvider, ScriptedProvider};
use chatrelay_loop::{TurnConfig, TurnRunner};
use chatrelay_store::{JsonFileDurableStore, MemorySessionCache, SessionStore};

use crate::config::{ProviderKind, ServerConfig, DEFAULT_FEED_POLL_INTERVAL};
use crate::hub::HubBroadcaster;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TurnRunner>,
    pub store: Arc<SessionStore>,
    pub hub: Arc<HubBroadcaster>,
    pub feed_poll_interval: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn LLMProvider>,
        summarizer: Arc<dyn Summarizer>,
        limits: PlannerLimits,
        turn_config: TurnConfig,
    ) -> Self {
        let planner = TokenBudgetPlanner::new(
            Arc::new(HeuristicTokenCounter::default()),
            summarizer,
            limits,
        );
        let runner = TurnRunner::new(store.clone(), planner, provider, turn_config);

        Self {
            runner: Arc::new(runner),
            store,
            hub: Arc::new(HubBroadcaster::new()),
            feed_poll_interval: DEFAULT_FEED_POLL_INTERVAL,
        }
    }

    pub fn with_feed_poll_interval(mut self, interval: Duration) -> Self {
        self.feed_poll_interval = interval;
        self
    }

    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let durable = JsonFileDurableStore::new(&config.data_dir);
        durable.init().await?;
        log::info!("Initializing session storage at: {:?}", config.data_dir);

        let store = Arc::new(
            SessionStore::new(
                Arc::new(MemorySessionCache::new(config.cache_capacity)),
                Arc::new(durable),
            )
            .with_cache_ttl(config.cache_ttl),
        );

        let (provider, summarizer, backend_titles): (
            Arc<dyn LLMProvider>,
            Arc<dyn Summarizer>,
            bool,
        ) = match config.provider {
            ProviderKind::OpenAI => {
                let provider: Arc<dyn LLMProvider> = Arc::new(
                    OpenAIProvider::new(config.api_key.clone())
                        .with_base_url(config.llm_base_url.clone())
                        .with_model(config.model.clone()),
                );
                let summarizer: Arc<dyn Summarizer> =
                    Arc::new(BackendSummarizer::new(provider.clone()));
                (provider, summarizer, true)
            }
            ProviderKind::Offline => {
                log::warn!("Using offline provider; replies echo the user message");
                let provider: Arc<dyn LLMProvider> = Arc::new(ScriptedProvider::new());
                let summarizer: Arc<dyn Summarizer> = Arc::new(HeuristicSummarizer::new());
                (provider, summarizer, false)
            }
        };

        let turn_config = TurnConfig {
            fallback_message: config.rate_limit_fallback.clone(),
            backend_titles,
            ..TurnConfig::default()
        };
        let limits = PlannerLimits::new(config.token_budget, config.portion_size);

        Ok(
            Self::new(store, provider, summarizer, limits, turn_config)
                .with_feed_poll_interval(config.feed_poll_interval),
        )
    }
}
