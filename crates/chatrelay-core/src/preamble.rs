//! Fixed persona instructions seeded into every new session.

use crate::message::ChatMessage;

pub const DEFAULT_PREAMBLE: &[&str] = &[
    "You are a helpful, friendly assistant. Answer clearly and concisely.",
    "If you do not know the answer, say so instead of guessing. Use Markdown for code and lists.",
];

/// Ordered set of System messages that open every newly created session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    lines: Vec<String>,
}

impl Preamble {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Fresh System messages for a new session, in preamble order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lines.iter().map(ChatMessage::system).collect()
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE.iter().copied())
    }
}
