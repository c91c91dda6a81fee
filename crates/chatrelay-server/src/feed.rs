//! Per-connection diffing for the poll feeds.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use chatrelay_core::{ChatMessage, ChatSession, SessionSummary};
use serde::Serialize;

/// Session-list feed state: which sessions were emitted and whether they had a title.
#[derive(Debug, Default)]
pub struct SessionFeed {
    emitted: HashMap<String, bool>,
}

impl SessionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summaries not yet emitted, plus sessions whose title appeared since.
    pub fn diff(&mut self, sessions: &[ChatSession]) -> Vec<SessionSummary> {
        let mut fresh = Vec::new();

        for session in sessions {
            let has_title = session.title.is_some();
            let emit = match self.emitted.get(&session.id) {
                None => true,
                Some(had_title) => !had_title && has_title,
            };
            if emit {
                self.emitted.insert(session.id.clone(), has_title);
                fresh.push(session.summary());
            }
        }

        fresh
    }
}

/// Message feed state for one session.
#[derive(Debug, Default)]
pub struct MessageFeed {
    emitted: HashSet<String>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-system messages not yet emitted, in conversation order.
    pub fn diff(&mut self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .filter(|message| !message.is_system())
            .filter(|message| self.emitted.insert(message.id.clone()))
            .cloned()
            .collect()
    }
}

/// Encode one SSE record: exactly `data: <json>\n\n`.
pub fn sse_record<T: Serialize>(payload: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}
