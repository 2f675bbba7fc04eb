//! Durable record of chat messages and connection events.
//!
//! [`ChatStore`] is the only way the rest of the service touches persistence.
//! `PgStore` backs it with PostgreSQL; `MemoryStore` keeps everything in
//! process for tests and database-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// What happened to a connection, as written to the connection log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Join,
    Leave,
    Disconnect,
}

impl ConnectionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Disconnect => "disconnect",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "join" => Some(Self::Join),
            "leave" => Some(Self::Leave),
            "disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewConnectionEvent<'a> {
    pub connection_id: &'a str,
    pub username: &'a str,
    pub room: &'a str,
    pub action: ConnectionAction,
    pub timestamp_ms: i64,
    pub source_address: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewChatMessage<'a> {
    pub connection_id: &'a str,
    pub username: &'a str,
    pub room: &'a str,
    pub text: &'a str,
    pub timestamp_ms: i64,
}

/// One message of a room's history, oldest first when returned in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HistoryEntry {
    #[serde(rename = "socketId")]
    pub connection_id: String,
    pub username: String,
    #[serde(rename = "message")]
    pub text: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConnectionLogEntry {
    pub username: String,
    pub action: ConnectionAction,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserMessage {
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_messages: i64,
    pub total_connections: i64,
    /// Distinct rooms that have at least one stored message.
    pub active_rooms: i64,
    /// Distinct usernames that have sent at least one stored message.
    pub total_users: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessageCount {
    pub room: String,
    pub count: i64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

/// Which messages an age-based purge applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope<'a> {
    Room(&'a str),
    AllRooms,
}

/// Persistence gateway consumed by the coordinator, the retention scheduler
/// and the HTTP query routes. Every operation is a single atomic statement.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn record_connection_event(&self, event: NewConnectionEvent<'_>)
        -> Result<i64, StoreError>;

    async fn record_message(&self, message: NewChatMessage<'_>) -> Result<i64, StoreError>;

    /// Most recent `limit` messages of `room`, returned in ascending time order.
    async fn fetch_room_history(&self, room: &str, limit: i64)
        -> Result<Vec<HistoryEntry>, StoreError>;

    /// Most recent `limit` connection log entries of `room`, ascending.
    async fn fetch_connection_logs(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<ConnectionLogEntry>, StoreError>;

    /// Most recent `limit` messages `username` sent in `room`, ascending.
    async fn fetch_user_messages(
        &self,
        username: &str,
        room: &str,
        limit: i64,
    ) -> Result<Vec<UserMessage>, StoreError>;

    async fn fetch_statistics(&self) -> Result<Statistics, StoreError>;

    /// Delete messages strictly older than `cutoff_ms`. Connection logs are never touched.
    async fn purge_older_than(&self, scope: PurgeScope<'_>, cutoff_ms: i64)
        -> Result<u64, StoreError>;

    async fn purge_all_messages(&self, room: &str) -> Result<u64, StoreError>;

    async fn list_rooms_with_message_counts(&self) -> Result<Vec<RoomMessageCount>, StoreError>;

    /// Release the underlying resources. Later calls fail with `StoreError::Failure`.
    async fn close(&self);
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_connection_event(event: &NewConnectionEvent<'_>) -> Result<(), StoreError> {
    require("socket_id", event.connection_id)?;
    require("username", event.username)?;
    require("room", event.room)
}

pub(crate) fn validate_message(message: &NewChatMessage<'_>) -> Result<(), StoreError> {
    require("socket_id", message.connection_id)?;
    require("username", message.username)?;
    require("room", message.room)?;
    require("message", message.text)
}

fn require(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation { field });
    }
    Ok(())
}
