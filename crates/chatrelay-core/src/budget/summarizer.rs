//! Conversation summarization for overflowing histories.
//!
//! When a history no longer fits the token budget, each portion of it is
//! condensed into one synthetic System message.

use std::sync::Arc;

use async_trait::async_trait;

use crate::budget::types::BudgetError;
use crate::message::{ChatMessage, Role};

/// Trait for summarization implementations.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Generate a summary of one contiguous portion of history.
    async fn summarize(&self, portion: &[ChatMessage]) -> Result<String, BudgetError>;
}

pub type SharedSummarizer = Arc<dyn Summarizer>;

/// Heuristic summarizer that extracts key points without calling a backend.
///
/// Lists user requests and the most recent assistant answers of the portion.
#[derive(Debug, Default, Clone)]
pub struct HeuristicSummarizer;

impl HeuristicSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn extract_user_requests<'a>(&self, messages: &'a [ChatMessage]) -> Vec<&'a str> {
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .filter(|m| !m.content.is_empty())
            .take(10)
            .map(|m| m.content.as_str())
            .collect()
    }

    fn extract_key_responses<'a>(&self, messages: &'a [ChatMessage]) -> Vec<&'a str> {
        messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .filter(|m| !m.content.is_empty())
            .rev()
            .take(3)
            .map(|m| m.content.as_str())
            .collect()
    }

    /// Truncate at a character boundary, never inside a multi-byte sequence.
    fn safe_truncate(&self, s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            return s.to_string();
        }
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, portion: &[ChatMessage]) -> Result<String, BudgetError> {
        if portion.is_empty() {
            return Ok("No conversation history.".to_string());
        }

        let requests = self.extract_user_requests(portion);
        let responses = self.extract_key_responses(portion);

        let mut parts = Vec::new();

        if !requests.is_empty() {
            parts.push("## User Requests".to_string());
            for (i, request) in requests.iter().enumerate() {
                parts.push(format!("{}. {}", i + 1, self.safe_truncate(request, 200)));
            }
        }

        if !responses.is_empty() {
            parts.push("\n## Key Outcomes".to_string());
            for (i, response) in responses.iter().enumerate() {
                parts.push(format!("{}. {}", i + 1, self.safe_truncate(response, 300)));
            }
        }

        if parts.is_empty() {
            Ok("Previous conversation context available.".to_string())
        } else {
            Ok(parts.join("\n"))
        }
    }
}
