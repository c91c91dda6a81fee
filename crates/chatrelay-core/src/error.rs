use thiserror::Error;

use crate::budget::BudgetError;

/// Error taxonomy shared by every delivery coordinator.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Completion backend is rate limited")]
    RateLimited,

    #[error("Completion backend produced an empty response")]
    EmptyResponse,

    #[error("Session store unavailable: {0}")]
    TransientStore(String),

    #[error("Completion backend error: {0}")]
    Backend(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<BudgetError> for ChatError {
    fn from(error: BudgetError) -> Self {
        match error {
            BudgetError::RateLimited => ChatError::RateLimited,
            BudgetError::Summarization(message) => ChatError::Backend(message),
            other => ChatError::Internal(other.to_string()),
        }
    }
}
