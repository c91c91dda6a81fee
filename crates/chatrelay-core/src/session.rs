use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;
use crate::preamble::Preamble;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub owner_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Session metadata without the message list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(id: impl Into<String>, owner_user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_user_id: owner_user_id.into(),
            title: None,
            last_activity: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Create a session that opens with the preamble System messages.
    ///
    /// A missing id gets a fresh UUID.
    pub fn seeded(id: Option<&str>, owner_user_id: &str, preamble: &Preamble) -> Self {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut session = Self::new(id, owner_user_id);
        session.messages = preamble.messages();
        session
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.last_activity = Utc::now();
    }

    /// Set the title unless one is already present. Returns whether it changed.
    pub fn set_title_once(&mut self, title: impl Into<String>) -> bool {
        if self.title.is_some() {
            return false;
        }
        self.title = Some(title.into());
        self.last_activity = Utc::now();
        true
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            timestamp: self.last_activity,
        }
    }

    /// Non-system messages, newest first, skipping `offset` and taking at most `limit`.
    pub fn history_page(&self, offset: usize, limit: usize) -> Vec<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .filter(|message| !message.is_system())
            .skip(offset)
            .take(limit)
            .collect()
    }

    pub fn first_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|message| message.role == crate::message::Role::User)
    }
}
