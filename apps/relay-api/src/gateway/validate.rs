//! Input rules for usernames, room names and message text.
//!
//! Each check trims its input and returns the trimmed slice on success.

use crate::error::ChatError;

pub const MAX_USERNAME_CHARS: usize = 20;
pub const MAX_ROOM_CHARS: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 500;

/// `^[A-Za-z0-9_一-鿿]{1,20}$`
pub fn username(raw: &str) -> Result<&str, ChatError> {
    let name = raw.trim();
    if within(name, MAX_USERNAME_CHARS) && name.chars().all(is_username_char) {
        Ok(name)
    } else {
        Err(ChatError::ValidationFailed { field: "username" })
    }
}

/// `^[A-Za-z0-9_-]{1,20}$`
pub fn room(raw: &str) -> Result<&str, ChatError> {
    let name = raw.trim();
    if within(name, MAX_ROOM_CHARS) && name.chars().all(is_room_char) {
        Ok(name)
    } else {
        Err(ChatError::ValidationFailed { field: "room" })
    }
}

pub fn message(raw: &str) -> Result<&str, ChatError> {
    let text = raw.trim();
    if within(text, MAX_MESSAGE_CHARS) {
        Ok(text)
    } else {
        Err(ChatError::ValidationFailed { field: "message" })
    }
}

fn within(s: &str, max_chars: usize) -> bool {
    !s.is_empty() && s.chars().count() <= max_chars
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{4e00}'..='\u{9fff}').contains(&c)
}

fn is_room_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}
