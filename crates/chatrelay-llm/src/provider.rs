use std::pin::Pin;

use async_trait::async_trait;
use chatrelay_core::{ChatError, PromptUnit};
use futures::{Stream, StreamExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl LLMError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LLMError::RateLimited(_))
    }
}

impl From<LLMError> for ChatError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::RateLimited(_) => ChatError::RateLimited,
            other => ChatError::Backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// One element of a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMChunk {
    /// An incremental text fragment
    Token(String),
    /// End-of-stream marker
    Done,
}

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stream a chat completion for the ordered prompt units.
    ///
    /// # Arguments
    /// * `units` - Prompt units in submission order
    /// * `max_output_tokens` - Maximum output tokens
    async fn chat_stream(
        &self,
        units: &[PromptUnit],
        max_output_tokens: Option<u32>,
    ) -> Result<LLMStream>;

    /// Run a completion to the end and return the concatenated text.
    async fn complete(&self, units: &[PromptUnit], max_output_tokens: Option<u32>) -> Result<String> {
        let mut stream = self.chat_stream(units, max_output_tokens).await?;
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                LLMChunk::Token(token) => text.push_str(&token),
                LLMChunk::Done => break,
            }
        }

        Ok(text)
    }
}
