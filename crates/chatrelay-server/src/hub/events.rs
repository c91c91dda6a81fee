use chatrelay_core::{ChatMessage, SessionSummary};
use serde::{Deserialize, Serialize};

/// Push event written to a hub connection as one JSON text frame.
///
/// Serialized as `{"event": "<kebab-name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum HubEvent {
    #[serde(rename_all = "camelCase")]
    TurnStart { session_id: String },

    #[serde(rename_all = "camelCase")]
    Fragment { session_id: String, text: String },

    #[serde(rename_all = "camelCase")]
    TurnEnd {
        session_id: String,
        response: String,
        rate_limited: bool,
    },

    SessionUpdate(SessionSummary),

    #[serde(rename_all = "camelCase")]
    SessionDeleted { user_id: String, session_id: String },

    #[serde(rename_all = "camelCase")]
    HistoryStart {
        session_id: String,
        offset: usize,
        count: usize,
    },

    #[serde(rename_all = "camelCase")]
    HistoryChunk {
        session_id: String,
        message: ChatMessage,
    },

    #[serde(rename_all = "camelCase")]
    HistoryEnd { session_id: String },

    #[serde(rename_all = "camelCase")]
    Error { message: String, error_type: String },
}

impl HubEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::TurnStart { .. } => "turn-start",
            HubEvent::Fragment { .. } => "fragment",
            HubEvent::TurnEnd { .. } => "turn-end",
            HubEvent::SessionUpdate(_) => "session-update",
            HubEvent::SessionDeleted { .. } => "session-deleted",
            HubEvent::HistoryStart { .. } => "history-start",
            HubEvent::HistoryChunk { .. } => "history-chunk",
            HubEvent::HistoryEnd { .. } => "history-end",
            HubEvent::Error { .. } => "error",
        }
    }
}
