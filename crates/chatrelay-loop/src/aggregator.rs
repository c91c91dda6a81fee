//! Fan-out of one streaming completion to live sinks.

use std::sync::Arc;

use chatrelay_core::{ChatError, PromptUnit};
use chatrelay_llm::{LLMChunk, LLMError, LLMProvider};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RATE_LIMIT_FALLBACK};
use crate::sink::FragmentSink;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Completion backend produced an empty response")]
    EmptyResponse,

    #[error("Cancelled")]
    Cancelled,

    #[error("Completion backend error: {0}")]
    Backend(String),
}

impl From<AggregateError> for ChatError {
    fn from(error: AggregateError) -> Self {
        match error {
            AggregateError::EmptyResponse => ChatError::EmptyResponse,
            AggregateError::Cancelled => ChatError::Cancelled,
            AggregateError::Backend(message) => ChatError::Backend(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// Full reply text, or the fallback message when rate limited
    pub text: String,
    /// Backend fragments forwarded before the stream ended
    pub fragments: usize,
    pub rate_limited: bool,
}

pub struct StreamAggregator {
    provider: Arc<dyn LLMProvider>,
    fallback_message: String,
    max_output_tokens: Option<u32>,
    channel_capacity: usize,
}

impl StreamAggregator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            fallback_message: DEFAULT_RATE_LIMIT_FALLBACK.to_string(),
            max_output_tokens: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    /// Stream a completion for `units` into every sink and return the full text.
    ///
    /// Sinks are closed on every exit path. A sink whose consumer is gone is
    /// detached; the remaining sinks keep receiving.
    pub async fn run(
        &self,
        session_id: &str,
        units: &[PromptUnit],
        sinks: Vec<Box<dyn FragmentSink>>,
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, AggregateError> {
        let mut sinks: Vec<Option<Box<dyn FragmentSink>>> = sinks.into_iter().map(Some).collect();
        let result = self.consume(session_id, units, &mut sinks, cancel).await;

        for sink in sinks.iter_mut().flatten() {
            sink.close().await;
        }

        result
    }

    /// Deliver the fallback message as the whole reply without calling the backend.
    pub async fn run_fallback(
        &self,
        session_id: &str,
        sinks: Vec<Box<dyn FragmentSink>>,
    ) -> AggregateOutcome {
        let mut sinks: Vec<Option<Box<dyn FragmentSink>>> = sinks.into_iter().map(Some).collect();
        let outcome = self.substitute_fallback(session_id, 0, &mut sinks).await;

        for sink in sinks.iter_mut().flatten() {
            sink.close().await;
        }

        outcome
    }

    async fn consume(
        &self,
        session_id: &str,
        units: &[PromptUnit],
        sinks: &mut [Option<Box<dyn FragmentSink>>],
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, AggregateError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AggregateError::Cancelled),
            opened = self.provider.chat_stream(units, self.max_output_tokens) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(LLMError::RateLimited(reason)) => {
                log::warn!("[{}] Backend rate limited before streaming: {}", session_id, reason);
                return Ok(self.substitute_fallback(session_id, 0, sinks).await);
            }
            Err(error) => return Err(AggregateError::Backend(error.to_string())),
        };

        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        let producer_cancel = cancel.child_token();
        // Stops the producer on every exit path of this function.
        let _producer_guard = producer_cancel.clone().drop_guard();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = producer_cancel.cancelled() => break,
                    item = stream.next() => item,
                };
                let Some(item) = item else { break };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let mut text = String::new();
        let mut fragments = 0usize;

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("[{}] Turn cancelled after {} fragments", session_id, fragments);
                    return Err(AggregateError::Cancelled);
                }
                item = rx.recv() => item,
            };

            match item {
                None | Some(Ok(LLMChunk::Done)) => break,
                Some(Ok(LLMChunk::Token(token))) => {
                    if token.is_empty() {
                        continue;
                    }
                    fan_out(session_id, sinks, &token).await;
                    text.push_str(&token);
                    fragments += 1;
                }
                Some(Err(LLMError::RateLimited(reason))) => {
                    log::warn!(
                        "[{}] Backend rate limited after {} fragments: {}",
                        session_id,
                        fragments,
                        reason
                    );
                    return Ok(self.substitute_fallback(session_id, fragments, sinks).await);
                }
                Some(Err(error)) => {
                    log::error!("[{}] Stream error: {}", session_id, error);
                    return Err(AggregateError::Backend(error.to_string()));
                }
            }
        }

        if fragments == 0 {
            log::error!("[{}] Backend completed without producing any fragment", session_id);
            return Err(AggregateError::EmptyResponse);
        }

        log::debug!(
            "[{}] Stream completed: {} fragments, {} chars",
            session_id,
            fragments,
            text.len()
        );

        Ok(AggregateOutcome {
            text,
            fragments,
            rate_limited: false,
        })
    }

    async fn substitute_fallback(
        &self,
        session_id: &str,
        fragments: usize,
        sinks: &mut [Option<Box<dyn FragmentSink>>],
    ) -> AggregateOutcome {
        fan_out(session_id, sinks, &self.fallback_message).await;
        AggregateOutcome {
            text: self.fallback_message.clone(),
            fragments,
            rate_limited: true,
        }
    }
}

async fn fan_out(session_id: &str, sinks: &mut [Option<Box<dyn FragmentSink>>], fragment: &str) {
    for (index, slot) in sinks.iter_mut().enumerate() {
        let delivered = match slot {
            Some(sink) => sink.send_fragment(fragment).await.is_ok(),
            None => continue,
        };
        if !delivered {
            log::warn!("[{}] Detaching sink {} whose consumer is gone", session_id, index);
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{BufferSink, ChannelSink};
    use chatrelay_core::ChatMessage;
    use chatrelay_llm::{ScriptedProvider, ScriptedReply};
    use std::time::Duration;

    fn units() -> Vec<PromptUnit> {
        vec![PromptUnit::Verbatim(ChatMessage::user("Hi"))]
    }

    fn aggregator(replies: Vec<ScriptedReply>) -> StreamAggregator {
        StreamAggregator::new(Arc::new(ScriptedProvider::with_replies(replies)))
            .with_fallback_message("busy")
    }

    #[tokio::test]
    async fn fragments_reach_every_sink_in_order() {
        let aggregator = aggregator(vec![ScriptedReply::fragments(["Hel", "lo"])]);
        let first = BufferSink::new();
        let second = BufferSink::new();

        let outcome = aggregator
            .run(
                "s",
                &units(),
                vec![Box::new(first.clone()), Box::new(second.clone())],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello");
        assert_eq!(outcome.fragments, 2);
        assert!(!outcome.rate_limited);
        for sink in [&first, &second] {
            assert_eq!(sink.fragments(), vec!["Hel".to_string(), "lo".to_string()]);
            assert!(sink.is_closed());
        }
    }

    #[tokio::test]
    async fn rate_limit_before_first_fragment_returns_fallback() {
        let aggregator = aggregator(vec![ScriptedReply::RejectRateLimited]);
        let sink = BufferSink::new();

        let outcome = aggregator
            .run("s", &units(), vec![Box::new(sink.clone())], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.text, "busy");
        assert!(outcome.rate_limited);
        assert_eq!(sink.fragments(), vec!["busy".to_string()]);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn rate_limit_mid_stream_substitutes_fallback() {
        let aggregator = aggregator(vec![ScriptedReply::RateLimitedAfter(vec!["par".into()])]);
        let sink = BufferSink::new();

        let outcome = aggregator
            .run("s", &units(), vec![Box::new(sink.clone())], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.text, "busy");
        assert_eq!(outcome.fragments, 1);
        assert_eq!(sink.fragments(), vec!["par".to_string(), "busy".to_string()]);
    }

    #[tokio::test]
    async fn zero_fragments_is_empty_response() {
        let aggregator = aggregator(vec![ScriptedReply::Fragments(Vec::new())]);
        let sink = BufferSink::new();

        let error = aggregator
            .run("s", &units(), vec![Box::new(sink.clone())], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(error, AggregateError::EmptyResponse));
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let aggregator = aggregator(vec![ScriptedReply::Fail("down".to_string())]);

        let error = aggregator
            .run("s", &units(), Vec::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(error, AggregateError::Backend(message) if message.contains("down")));
    }

    #[tokio::test]
    async fn detached_sink_does_not_stop_the_others() {
        let aggregator = aggregator(vec![ScriptedReply::fragments(["a", "b"])]);
        let (gone, rx) = ChannelSink::channel(1);
        drop(rx);
        let live = BufferSink::new();

        let outcome = aggregator
            .run(
                "s",
                &units(),
                vec![Box::new(gone), Box::new(live.clone())],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.text, "ab");
        assert_eq!(live.fragments(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_call_and_closes_sinks() {
        let provider = ScriptedProvider::with_replies([ScriptedReply::fragments(["a", "b", "c"])])
            .with_fragment_delay(Duration::from_millis(200));
        let aggregator = StreamAggregator::new(Arc::new(provider));
        let sink = BufferSink::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let error = aggregator
            .run("s", &units(), vec![Box::new(sink.clone())], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(error, AggregateError::Cancelled));
        assert!(sink.fragments().is_empty());
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn run_fallback_delivers_only_the_fallback() {
        let aggregator = aggregator(Vec::new());
        let sink = BufferSink::new();

        let outcome = aggregator.run_fallback("s", vec![Box::new(sink.clone())]).await;

        assert!(outcome.rate_limited);
        assert_eq!(sink.fragments(), vec!["busy".to_string()]);
        assert!(sink.is_closed());
    }
}
