use chatrelay_core::ChatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Durable store unavailable: {0}")]
    DurableUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for ChatError {
    fn from(error: StoreError) -> Self {
        ChatError::TransientStore(error.to_string())
    }
}
