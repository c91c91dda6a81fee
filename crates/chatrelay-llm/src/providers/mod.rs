pub mod openai;
pub mod scripted;

pub use openai::OpenAIProvider;
pub use scripted::{ScriptedProvider, ScriptedReply};
