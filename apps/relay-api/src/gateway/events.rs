//! Wire-format events exchanged over the chat socket.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. Event names are
//! shared with existing browser clients and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::HistoryEntry;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join room")]
    JoinRoom(JoinRoomPayload),
    #[serde(rename = "chat message")]
    ChatMessage(ChatMessagePayload),
    #[serde(rename = "leave room")]
    LeaveRoom(LeaveRoomPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub text: String,
    /// Client display time, relayed untouched.
    #[serde(default)]
    pub time: Value,
}

/// `username` is accepted for compatibility but the session's own name is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaveRoomPayload {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room: String,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room joined")]
    RoomJoined { username: String, room: String },
    #[serde(rename = "room history")]
    RoomHistory(Vec<HistoryMessage>),
    #[serde(rename = "user list")]
    UserList(Vec<String>),
    #[serde(rename = "chat message")]
    ChatMessage(ChatBroadcast),
    #[serde(rename = "system message")]
    SystemMessage { message: String },
    #[serde(rename = "user left")]
    UserLeft { username: String },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    pub username: String,
    pub message: String,
    pub timestamp: i64,
}

impl From<HistoryEntry> for HistoryMessage {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            username: entry.username,
            message: entry.text,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatBroadcast {
    pub username: String,
    pub text: String,
    pub time: Value,
    #[serde(rename = "socketId")]
    pub socket_id: String,
}
