//! One conversational turn, shared by every delivery transport.

use std::sync::Arc;

use chatrelay_core::{BudgetError, ChatError, ChatMessage, ChatSession, SessionSummary, TokenBudgetPlanner};
use chatrelay_llm::LLMProvider;
use chatrelay_store::SessionStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::{AggregateOutcome, StreamAggregator};
use crate::config::TurnConfig;
use crate::sink::{close_sinks, FragmentSink};
use crate::title::TitleGenerator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    pub message: String,
}

impl TurnRequest {
    pub fn new(
        user_id: impl Into<String>,
        session_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.filter(|id| !id.is_empty()),
            message: message.into(),
        }
    }

    /// Assign a fresh session id up front when none was given.
    ///
    /// Transports that announce the session before streaming use this.
    pub fn with_resolved_session_id(mut self) -> Self {
        if self.session_id.is_none() {
            self.session_id = Some(Uuid::new_v4().to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub session_id: String,
    pub response: String,
    pub rate_limited: bool,
    pub title_changed: bool,
    pub summary: SessionSummary,
}

/// Runs the turn pipeline: load, append, plan, stream, title, save.
pub struct TurnRunner {
    store: Arc<SessionStore>,
    planner: TokenBudgetPlanner,
    aggregator: StreamAggregator,
    titles: TitleGenerator,
}

impl TurnRunner {
    pub fn new(
        store: Arc<SessionStore>,
        planner: TokenBudgetPlanner,
        provider: Arc<dyn LLMProvider>,
        config: TurnConfig,
    ) -> Self {
        let aggregator = StreamAggregator::new(provider.clone())
            .with_fallback_message(config.fallback_message.clone())
            .with_max_output_tokens(config.max_output_tokens)
            .with_channel_capacity(config.channel_capacity);
        let titles = TitleGenerator::new(provider, config.title_max_length, config.backend_titles);

        Self {
            store,
            planner,
            aggregator,
            titles,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one turn, streaming the reply into `sinks`.
    ///
    /// The user's message is persisted even when the backend leg fails.
    pub async fn run(
        &self,
        request: TurnRequest,
        sinks: Vec<Box<dyn FragmentSink>>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        if let Err(error) = validate(&request) {
            close_sinks(sinks).await;
            return Err(error);
        }

        let user_id = request.user_id.as_str();
        let _guard = self.store.lock_user(user_id).await;

        let mut sessions = match self.store.get_or_create_sessions(user_id).await {
            Ok(sessions) => sessions,
            Err(error) => {
                close_sinks(sinks).await;
                return Err(error.into());
            }
        };

        let (session_id, history) = {
            let session =
                self.store
                    .get_or_create_session(&mut sessions, user_id, request.session_id.as_deref());
            session.append(ChatMessage::user(request.message.trim()));
            (session.id.clone(), session.messages.clone())
        };
        log::info!(
            "[{}] Turn started for user {} with {} messages",
            session_id,
            user_id,
            history.len()
        );

        let outcome = match self.stream_reply(&session_id, &history, sinks, cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                log::warn!("[{}] Turn failed: {}", session_id, error);
                if let Err(save_error) = self.store.save_turn(user_id, &sessions, &session_id).await {
                    log::error!(
                        "[{}] Failed to persist user message after turn failure: {}",
                        session_id,
                        save_error
                    );
                }
                return Err(error);
            }
        };

        let session = find_session(&mut sessions, &session_id)?;
        session.append(ChatMessage::assistant(outcome.text.clone()));

        let mut title_changed = false;
        if session.title.is_none() && !outcome.rate_limited {
            let first_user = session
                .first_user_message()
                .map(|message| message.content.clone())
                .unwrap_or_default();
            let title = self
                .titles
                .generate(&session_id, &first_user, &outcome.text)
                .await;
            title_changed = session.set_title_once(title);
        }
        let summary = session.summary();

        self.store.save_turn(user_id, &sessions, &session_id).await?;

        log::info!(
            "[{}] Turn completed: {} chars, rate_limited={}",
            session_id,
            outcome.text.len(),
            outcome.rate_limited
        );

        Ok(TurnOutcome {
            session_id,
            response: outcome.text,
            rate_limited: outcome.rate_limited,
            title_changed,
            summary,
        })
    }

    async fn stream_reply(
        &self,
        session_id: &str,
        history: &[ChatMessage],
        sinks: Vec<Box<dyn FragmentSink>>,
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, ChatError> {
        let plan = match self.planner.plan(history).await {
            Ok(plan) => plan,
            Err(BudgetError::RateLimited) => {
                log::warn!("[{}] Summarization rate limited, using fallback reply", session_id);
                return Ok(self.aggregator.run_fallback(session_id, sinks).await);
            }
            Err(error) => {
                close_sinks(sinks).await;
                return Err(error.into());
            }
        };

        log::debug!(
            "[{}] Prompt plan: {} verbatim ({} tokens), {} summarized portions, overflowed={}",
            session_id,
            plan.verbatim_count,
            plan.verbatim_tokens,
            plan.summarized_portions,
            plan.overflowed
        );

        Ok(self
            .aggregator
            .run(session_id, &plan.units, sinks, cancel)
            .await?)
    }
}

fn validate(request: &TurnRequest) -> Result<(), ChatError> {
    if request.user_id.trim().is_empty() {
        return Err(ChatError::validation("user id is required"));
    }
    if request.message.trim().is_empty() {
        return Err(ChatError::validation("message must not be empty"));
    }
    Ok(())
}

fn find_session<'a>(
    sessions: &'a mut [ChatSession],
    session_id: &str,
) -> Result<&'a mut ChatSession, ChatError> {
    sessions
        .iter_mut()
        .find(|session| session.id == session_id)
        .ok_or_else(|| ChatError::Internal(format!("session {} vanished mid-turn", session_id)))
}
