use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Client invocation received on a hub connection.
///
/// `{"invocation": "SendMessage", "message": "...", "sessionId": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "invocation")]
pub enum Invocation {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        message: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    GetHistory {
        session_id: String,
        #[serde(default)]
        offset: usize,
        #[serde(default = "default_history_limit")]
        limit: usize,
    },
}

impl Invocation {
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_message_with_optional_session() {
        let invocation = Invocation::parse(r#"{"invocation":"SendMessage","message":"hi"}"#).unwrap();

        assert_eq!(
            invocation,
            Invocation::SendMessage {
                message: "hi".to_string(),
                session_id: None
            }
        );
    }

    #[test]
    fn get_history_defaults_paging() {
        let invocation =
            Invocation::parse(r#"{"invocation":"GetHistory","sessionId":"s1"}"#).unwrap();

        assert_eq!(
            invocation,
            Invocation::GetHistory {
                session_id: "s1".to_string(),
                offset: 0,
                limit: DEFAULT_HISTORY_LIMIT
            }
        );
    }

    #[test]
    fn unknown_invocation_is_rejected() {
        assert!(Invocation::parse(r#"{"invocation":"Shutdown"}"#).is_err());
        assert!(Invocation::parse("not json").is_err());
    }
}
