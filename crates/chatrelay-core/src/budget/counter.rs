//! Token counting for budget management.
//!
//! Provides heuristic token estimation (chars/4 + 10% margin). Real tokenizers
//! plug in through the [`TokenCounter`] trait.

use std::sync::Arc;

use crate::budget::types::BudgetError;
use crate::message::ChatMessage;

/// Trait for token counting implementations.
///
/// Counting must be additive and deterministic for identical text.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> Result<u32, BudgetError>;

    /// Count tokens in a single message, including per-message overhead.
    fn count_message(&self, message: &ChatMessage) -> Result<u32, BudgetError> {
        self.count_text(&message.content)
    }

    /// Count tokens in multiple messages.
    fn count_messages(&self, messages: &[ChatMessage]) -> Result<u32, BudgetError> {
        messages.iter().try_fold(0u32, |acc, message| {
            Ok(acc.saturating_add(self.count_message(message)?))
        })
    }
}

/// Heuristic token counter using character-based estimation.
///
/// Uses the approximation: tokens ≈ characters / 4, with a 10% safety margin
/// plus a fixed overhead per message for role framing.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
    /// Role/framing overhead per message in tokens
    message_overhead: u32,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: f64, safety_margin: f64, message_overhead: u32) -> Self {
        Self {
            chars_per_token,
            safety_margin,
            message_overhead,
        }
    }

    /// Create with default parameters (chars/4 + 10% margin + 4 tokens per message).
    pub fn with_defaults() -> Self {
        Self::new(4.0, 1.1, 4)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> Result<u32, BudgetError> {
        if text.is_empty() {
            return Ok(0);
        }
        if self.chars_per_token <= 0.0 {
            return Err(BudgetError::TokenCount(format!(
                "invalid chars_per_token ratio {}",
                self.chars_per_token
            )));
        }

        let char_count = text.chars().count() as f64;
        let adjusted = (char_count / self.chars_per_token) * self.safety_margin;

        Ok(adjusted.ceil() as u32)
    }

    fn count_message(&self, message: &ChatMessage) -> Result<u32, BudgetError> {
        Ok(self
            .count_text(&message.content)?
            .saturating_add(self.message_overhead))
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;
