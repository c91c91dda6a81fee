pub mod budget;
pub mod error;
pub mod message;
pub mod preamble;
pub mod session;
pub mod title;

pub use budget::{
    BudgetError, HeuristicSummarizer, HeuristicTokenCounter, PlannerLimits, PromptPlan,
    PromptUnit, Summarizer, TokenBudgetPlanner, TokenCounter,
};
pub use error::ChatError;
pub use message::{ChatMessage, Role};
pub use preamble::Preamble;
pub use session::{ChatSession, SessionSummary};
