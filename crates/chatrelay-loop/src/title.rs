//! Session titles from the first exchange of a session.

use std::sync::Arc;

use chatrelay_core::title::{build_title_prompt, sanitize_title, DEFAULT_FALLBACK_TITLE};
use chatrelay_core::{ChatMessage, PromptUnit};
use chatrelay_llm::LLMProvider;

const TITLE_MAX_OUTPUT_TOKENS: u32 = 32;

pub struct TitleGenerator {
    provider: Arc<dyn LLMProvider>,
    max_length: usize,
    use_backend: bool,
}

impl TitleGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, max_length: usize, use_backend: bool) -> Self {
        Self {
            provider,
            max_length,
            use_backend,
        }
    }

    /// Produce a title for a session from its first user message and reply.
    ///
    /// Falls back to the sanitized user message when the backend fails.
    pub async fn generate(&self, session_id: &str, user_message: &str, reply: &str) -> String {
        let fallback = sanitize_title(user_message, self.max_length, DEFAULT_FALLBACK_TITLE);
        if !self.use_backend {
            return fallback;
        }

        let prompt = build_title_prompt(user_message, reply, self.max_length);
        let units = vec![PromptUnit::Verbatim(ChatMessage::user(prompt))];

        match self
            .provider
            .complete(&units, Some(TITLE_MAX_OUTPUT_TOKENS))
            .await
        {
            Ok(raw) => {
                let title = sanitize_title(&raw, self.max_length, &fallback);
                log::debug!("[{}] Generated title: {}", session_id, title);
                title
            }
            Err(error) => {
                log::warn!(
                    "[{}] Title generation failed, using first message: {}",
                    session_id,
                    error
                );
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_llm::{ScriptedProvider, ScriptedReply};

    #[tokio::test]
    async fn backend_title_is_sanitized() {
        let provider = Arc::new(ScriptedProvider::with_replies([ScriptedReply::fragments([
            "\"Weekend ", "Plans.\"",
        ])]));
        let generator = TitleGenerator::new(provider, 60, true);

        let title = generator.generate("s", "what should I do this weekend", "Go hiking").await;

        assert_eq!(title, "Weekend Plans");
    }

    #[tokio::test]
    async fn backend_failure_uses_first_message() {
        let provider = Arc::new(ScriptedProvider::with_replies([ScriptedReply::Fail(
            "down".to_string(),
        )]));
        let generator = TitleGenerator::new(provider, 60, true);

        let title = generator.generate("s", "Hello there", "Hi").await;

        assert_eq!(title, "Hello there");
    }

    #[tokio::test]
    async fn first_message_mode_skips_the_backend() {
        let provider = Arc::new(ScriptedProvider::new());
        let generator = TitleGenerator::new(provider.clone(), 10, false);

        let title = generator.generate("s", "Tell me about rust lifetimes", "Sure").await;

        assert_eq!(title, "Tell me");
        assert!(provider.requests().is_empty());
    }
}
