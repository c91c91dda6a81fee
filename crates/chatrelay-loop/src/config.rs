use chatrelay_core::title::DEFAULT_TITLE_MAX_LENGTH;

pub const DEFAULT_RATE_LIMIT_FALLBACK: &str =
    "I'm receiving too many requests right now. Please try again in a moment.";

/// Fragments buffered between the backend stream and the aggregator.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for the turn pipeline.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Text substituted for the reply when the backend is rate limited
    pub fallback_message: String,
    pub max_output_tokens: Option<u32>,
    pub channel_capacity: usize,
    pub title_max_length: usize,
    /// Ask the backend for titles instead of deriving them from the first user message
    pub backend_titles: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_RATE_LIMIT_FALLBACK.to_string(),
            max_output_tokens: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            title_max_length: DEFAULT_TITLE_MAX_LENGTH,
            backend_titles: true,
        }
    }
}
