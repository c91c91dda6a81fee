//! Session title helpers.

pub const DEFAULT_TITLE_MAX_LENGTH: usize = 60;
pub const DEFAULT_FALLBACK_TITLE: &str = "New Chat";

/// Build the instruction used to ask the backend for a session title.
pub fn build_title_prompt(user_message: &str, assistant_reply: &str, max_length: usize) -> String {
    format!(
        "You generate concise, descriptive chat titles. \
         Respond with Title Case text, without quotes or trailing punctuation. \
         Maximum length: {} characters.\n\n\
         Conversation:\nUser: {}\nAssistant: {}",
        max_length,
        user_message.trim(),
        assistant_reply.trim()
    )
}

/// Reduce raw text to a single-line title of at most `max_length` characters.
pub fn sanitize_title(raw: &str, max_length: usize, fallback: &str) -> String {
    let first_line = raw.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let cleaned = first_line
        .trim()
        .trim_start_matches(|c: char| c == '#')
        .trim()
        .trim_matches(|c: char| {
            matches!(
                c,
                '"' | '\'' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}'
            )
        });

    if cleaned.is_empty() {
        return fallback.to_string();
    }

    let mut truncated: String = cleaned.chars().take(max_length).collect();
    if cleaned.chars().count() > max_length {
        if let Some(last_space) = truncated.rfind(' ') {
            truncated.truncate(last_space);
        }
    }

    let trimmed = truncated
        .trim()
        .trim_matches(|c: char| matches!(c, '.' | '-' | ':' | ','))
        .trim();

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
