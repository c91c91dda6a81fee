//! Summarizer backed by the completion provider.

use std::sync::Arc;

use async_trait::async_trait;
use chatrelay_core::{BudgetError, ChatMessage, PromptUnit, Role, Summarizer};

use crate::provider::LLMProvider;

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation excerpt in a few sentences. \
Keep names, decisions, open questions and any facts the assistant will need later. \
Reply with the summary only.";

pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 512;

pub struct BackendSummarizer {
    provider: Arc<dyn LLMProvider>,
    max_output_tokens: u32,
}

impl BackendSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_output_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn build_units(portion: &[ChatMessage]) -> Vec<PromptUnit> {
        let transcript = portion
            .iter()
            .map(|message| format!("{}: {}", message.role.as_str(), message.content))
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            PromptUnit::Verbatim(ChatMessage::system(SUMMARY_INSTRUCTION)),
            PromptUnit::Verbatim(ChatMessage::new(Role::User, transcript)),
        ]
    }
}

#[async_trait]
impl Summarizer for BackendSummarizer {
    async fn summarize(&self, portion: &[ChatMessage]) -> Result<String, BudgetError> {
        let units = Self::build_units(portion);

        let summary = self
            .provider
            .complete(&units, Some(self.max_output_tokens))
            .await
            .map_err(|error| {
                if error.is_rate_limited() {
                    BudgetError::RateLimited
                } else {
                    BudgetError::Summarization(error.to_string())
                }
            })?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(BudgetError::Summarization(
                "backend returned an empty summary".to_string(),
            ));
        }

        log::debug!(
            "Summarized {} messages into {} chars",
            portion.len(),
            summary.len()
        );
        Ok(summary.to_string())
    }
}
