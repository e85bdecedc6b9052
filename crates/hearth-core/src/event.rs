//! Chat events: the entries of the persisted, append-only history.

use serde::{Deserialize, Serialize};

use crate::registry::Session;

/// Author name used for server announcements and private system replies.
pub const SERVER_AUTHOR: &str = "Server";
const SERVER_COLOR: &str = "#000000";
const SERVER_AVATAR: &str = "S";

/// One published message, as stored in history and broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub author: String,
    pub text: String,
    pub color: String,
    pub avatar: String,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

impl ChatEvent {
    /// A message authored by the server itself.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            author: SERVER_AUTHOR.to_string(),
            text: text.into(),
            color: SERVER_COLOR.to_string(),
            avatar: SERVER_AVATAR.to_string(),
            timestamp: unix_millis(),
        }
    }

    /// A message sent by a participant. Uses the original name so an idle
    /// participant's message is not labeled idle.
    pub fn from_session(session: &Session, text: impl Into<String>) -> Self {
        Self {
            author: session.original_name().to_string(),
            text: text.into(),
            color: session.color.clone(),
            avatar: session.avatar.clone(),
            timestamp: unix_millis(),
        }
    }
}

/// Current wall-clock time as Unix milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
