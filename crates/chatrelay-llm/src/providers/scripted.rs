//! Offline provider that replays scripted replies.
//!
//! Used by the `offline` provider setting and throughout the test suites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chatrelay_core::{PromptUnit, Role};
use futures::StreamExt;

use crate::provider::{LLMChunk, LLMError, LLMProvider, LLMStream, Result};

/// One scripted completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Stream the fragments, then finish normally
    Fragments(Vec<String>),
    /// Stream the fragments, then fail with a rate-limit error
    RateLimitedAfter(Vec<String>),
    /// Refuse the request with a rate-limit error before streaming
    RejectRateLimited,
    /// Refuse the request with a generic backend error
    Fail(String),
}

impl ScriptedReply {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

/// Provider that pops one [`ScriptedReply`] per request.
///
/// Once the queue is empty it echoes the latest user message word by word.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Vec<PromptUnit>>>,
    fragment_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Pause before each fragment to mimic a network backend.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Prompt units of every request received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<PromptUnit>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, units: &[PromptUnit]) -> ScriptedReply {
        let scripted = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());

        scripted.unwrap_or_else(|| echo_reply(units))
    }
}

fn echo_reply(units: &[PromptUnit]) -> ScriptedReply {
    let last_user = units
        .iter()
        .rev()
        .find(|unit| !unit.is_summary() && unit.role() == Role::User)
        .map(|unit| unit.content())
        .unwrap_or_default();

    let text = format!("You said: {}", last_user);
    ScriptedReply::Fragments(text.split_inclusive(' ').map(str::to_string).collect())
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        units: &[PromptUnit],
        _max_output_tokens: Option<u32>,
    ) -> Result<LLMStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(units.to_vec());
        }

        let items: Vec<Result<LLMChunk>> = match self.next_reply(units) {
            ScriptedReply::Fragments(fragments) => {
                fragments.into_iter().map(|f| Ok(LLMChunk::Token(f))).collect()
            }
            ScriptedReply::RateLimitedAfter(fragments) => fragments
                .into_iter()
                .map(|f| Ok(LLMChunk::Token(f)))
                .chain(std::iter::once(Err(LLMError::RateLimited(
                    "scripted rate limit".to_string(),
                ))))
                .collect(),
            ScriptedReply::RejectRateLimited => {
                return Err(LLMError::RateLimited("scripted rate limit".to_string()))
            }
            ScriptedReply::Fail(message) => return Err(LLMError::Api(message)),
        };

        let delay = self.fragment_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::ChatMessage;

    fn prompt(text: &str) -> Vec<PromptUnit> {
        vec![
            PromptUnit::Verbatim(ChatMessage::system("persona")),
            PromptUnit::Verbatim(ChatMessage::user(text)),
        ]
    }

    #[tokio::test]
    async fn replays_scripted_fragments_in_order() {
        let provider = ScriptedProvider::with_replies([ScriptedReply::fragments(["Hel", "lo"])]);

        let stream = provider.chat_stream(&prompt("hi"), None).await.unwrap();
        let chunks: Vec<LLMChunk> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(
            chunks,
            vec![
                LLMChunk::Token("Hel".to_string()),
                LLMChunk::Token("lo".to_string())
            ]
        );
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn echoes_when_queue_is_empty() {
        let provider = ScriptedProvider::new();

        let text = provider.complete(&prompt("ping pong"), None).await.unwrap();

        assert_eq!(text, "You said: ping pong");
    }

    #[tokio::test]
    async fn rate_limit_after_fragments_surfaces_in_stream() {
        let provider =
            ScriptedProvider::with_replies([ScriptedReply::RateLimitedAfter(vec!["par".into()])]);

        let mut stream = provider.chat_stream(&prompt("hi"), None).await.unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            LLMChunk::Token("par".to_string())
        );
        assert!(stream.next().await.unwrap().unwrap_err().is_rate_limited());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn rejected_requests_fail_before_streaming() {
        let provider = ScriptedProvider::with_replies([
            ScriptedReply::RejectRateLimited,
            ScriptedReply::Fail("down".to_string()),
        ]);

        let first = provider.chat_stream(&prompt("a"), None).await;
        assert!(matches!(first, Err(LLMError::RateLimited(_))));

        let second = provider.chat_stream(&prompt("b"), None).await;
        assert!(matches!(second, Err(LLMError::Api(message)) if message == "down"));
    }
}
