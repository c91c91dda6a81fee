//! Token budget management for completion requests.
//!
//! The planner walks the conversation in order, keeping messages verbatim while
//! they fit the token ceiling, and falls back to portion-by-portion
//! summarization once the history overflows.
//!
//! # Key Components
//!
//! - [`types`]: `PlannerLimits`, `PromptUnit`, `PromptPlan`, `BudgetError`
//! - [`counter`]: token counting via heuristic estimation
//! - [`summarizer`]: the summarization seam plus an offline heuristic summarizer
//! - [`planner`]: the budget planner itself

pub mod counter;
pub mod planner;
pub mod summarizer;
pub mod types;

pub use counter::{HeuristicTokenCounter, SharedTokenCounter, TokenCounter};
pub use planner::{plan_prompt, TokenBudgetPlanner};
pub use summarizer::{HeuristicSummarizer, SharedSummarizer, Summarizer};
pub use types::{
    BudgetError, PlannerLimits, PromptPlan, PromptUnit, DEFAULT_PORTION_SIZE,
    DEFAULT_TOKEN_BUDGET,
};
