//! Core types for token budget management.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{ChatMessage, Role};

/// Default token ceiling for a single completion request.
pub const DEFAULT_TOKEN_BUDGET: u32 = 8000;
/// Default number of messages summarized together once the budget overflows.
pub const DEFAULT_PORTION_SIZE: usize = 30;

/// Deployment constants controlling the planner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannerLimits {
    /// Maximum total tokens of verbatim messages sent to the backend
    pub token_budget: u32,
    /// Messages per summarized portion
    pub portion_size: usize,
}

impl PlannerLimits {
    pub fn new(token_budget: u32, portion_size: usize) -> Self {
        Self {
            token_budget,
            portion_size,
        }
    }

    /// Portion size clamped to at least one message.
    pub fn effective_portion_size(&self) -> usize {
        self.portion_size.max(1)
    }
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BUDGET, DEFAULT_PORTION_SIZE)
    }
}

/// One entry of the prompt submitted to the completion backend.
///
/// Produced only by the planner and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptUnit {
    /// An original history message, unchanged
    Verbatim(ChatMessage),
    /// Synthetic System message summarizing `covers` (indices into the original history)
    Summary { content: String, covers: Range<usize> },
}

impl PromptUnit {
    pub fn role(&self) -> Role {
        match self {
            PromptUnit::Verbatim(message) => message.role,
            PromptUnit::Summary { .. } => Role::System,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            PromptUnit::Verbatim(message) => &message.content,
            PromptUnit::Summary { content, .. } => content,
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, PromptUnit::Summary { .. })
    }
}

impl From<ChatMessage> for PromptUnit {
    fn from(message: ChatMessage) -> Self {
        PromptUnit::Verbatim(message)
    }
}

/// Result of planning a prompt.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    /// Prompt units in submission order
    pub units: Vec<PromptUnit>,
    /// Number of leading verbatim units
    pub verbatim_count: usize,
    /// Number of summary units appended after the verbatim prefix
    pub summarized_portions: usize,
    /// Token total of the verbatim prefix
    pub verbatim_tokens: u32,
    /// Whether the history overflowed the budget
    pub overflowed: bool,
}

impl PromptPlan {
    pub fn is_fully_verbatim(&self) -> bool {
        !self.overflowed && self.summarized_portions == 0
    }
}

/// Errors that can occur during budget planning.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Token counting failed
    #[error("Failed to count tokens: {0}")]
    TokenCount(String),

    /// The summarization backend refused the request because of rate limiting
    #[error("Summarization backend is rate limited")]
    RateLimited,

    /// Any other summarization failure
    #[error("Failed to summarize history: {0}")]
    Summarization(String),
}
