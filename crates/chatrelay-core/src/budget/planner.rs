//! Prompt planning under a hard token ceiling.

use std::sync::Arc;

use crate::budget::counter::TokenCounter;
use crate::budget::summarizer::Summarizer;
use crate::budget::types::{BudgetError, PlannerLimits, PromptPlan, PromptUnit};
use crate::message::ChatMessage;

/// Turns a full conversation history into a bounded prompt.
#[derive(Clone)]
pub struct TokenBudgetPlanner {
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn Summarizer>,
    limits: PlannerLimits,
}

impl std::fmt::Debug for TokenBudgetPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgetPlanner")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl TokenBudgetPlanner {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        summarizer: Arc<dyn Summarizer>,
        limits: PlannerLimits,
    ) -> Self {
        Self {
            counter,
            summarizer,
            limits,
        }
    }

    pub fn limits(&self) -> PlannerLimits {
        self.limits
    }

    /// Plan a prompt for `history` with the configured limits.
    pub async fn plan(&self, history: &[ChatMessage]) -> Result<PromptPlan, BudgetError> {
        plan_prompt(
            history,
            self.limits,
            self.counter.as_ref(),
            self.summarizer.as_ref(),
        )
        .await
    }
}

/// Plan a prompt for `history` under `limits`.
///
/// Messages are emitted verbatim, in order, while the running token total
/// stays within the budget. The first message that would overflow switches to
/// summarization: the *entire* history is split into contiguous portions of
/// `portion_size` messages and each portion is summarized by one sequential
/// summarizer call. The summaries are appended after the verbatim prefix, so
/// they cover the prefix messages as well.
pub async fn plan_prompt(
    history: &[ChatMessage],
    limits: PlannerLimits,
    counter: &dyn TokenCounter,
    summarizer: &dyn Summarizer,
) -> Result<PromptPlan, BudgetError> {
    let mut units = Vec::with_capacity(history.len());
    let mut verbatim_tokens: u32 = 0;
    let mut overflowed = false;

    for message in history {
        let tokens = counter.count_message(message)?;
        if verbatim_tokens.saturating_add(tokens) > limits.token_budget {
            overflowed = true;
            break;
        }
        verbatim_tokens = verbatim_tokens.saturating_add(tokens);
        units.push(PromptUnit::Verbatim(message.clone()));
    }

    let verbatim_count = units.len();
    let mut summarized_portions = 0;

    if overflowed {
        let portion_size = limits.effective_portion_size();
        log::debug!(
            "History of {} messages overflowed budget of {} tokens after {} verbatim messages, summarizing in portions of {}",
            history.len(),
            limits.token_budget,
            verbatim_count,
            portion_size
        );

        for (index, portion) in history.chunks(portion_size).enumerate() {
            let start = index * portion_size;
            let content = summarizer.summarize(portion).await?;
            units.push(PromptUnit::Summary {
                content,
                covers: start..start + portion.len(),
            });
            summarized_portions += 1;
        }
    }

    Ok(PromptPlan {
        units,
        verbatim_count,
        summarized_portions,
        verbatim_tokens,
        overflowed,
    })
}
