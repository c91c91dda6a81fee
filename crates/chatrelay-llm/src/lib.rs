pub mod provider;
pub mod providers;
pub mod sse;
pub mod summarizer;

pub use provider::{LLMChunk, LLMError, LLMProvider, LLMStream, Result};
pub use providers::{OpenAIProvider, ScriptedProvider, ScriptedReply};
pub use summarizer::BackendSummarizer;
