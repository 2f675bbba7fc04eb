use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::models::connection_log::ConnectionLogRow;
use crate::models::message::ChatMessageRow;

use super::{
    validate_connection_event, validate_message, ChatStore, ConnectionAction, ConnectionLogEntry,
    HistoryEntry, NewChatMessage, NewConnectionEvent, PurgeScope, RoomMessageCount, Statistics,
    UserMessage,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    messages: Vec<ChatMessageRow>,
    logs: Vec<ConnectionLogRow>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process implementation of [`ChatStore`].
///
/// Rows keep insertion order, so ties on `timestamp` resolve by id the same
/// way the SQL store does.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Failure("store is closed".to_string()));
        }
        Ok(())
    }
}

/// Keep the `limit` newest rows (by timestamp, then id) in ascending order.
fn newest_ascending<T: Clone>(
    mut rows: Vec<T>,
    key: impl Fn(&T) -> (i64, i64),
    limit: i64,
) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    let keep = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
    let skip = rows.len().saturating_sub(keep);
    rows.split_off(skip)
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn record_connection_event(
        &self,
        event: NewConnectionEvent<'_>,
    ) -> Result<i64, StoreError> {
        self.ensure_open()?;
        validate_connection_event(&event)?;
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.logs.push(ConnectionLogRow {
            id,
            socket_id: event.connection_id.to_string(),
            username: event.username.to_string(),
            room: event.room.to_string(),
            action: event.action.as_str().to_string(),
            timestamp: event.timestamp_ms,
            ip_address: event.source_address.map(str::to_string),
        });
        Ok(id)
    }

    async fn record_message(&self, message: NewChatMessage<'_>) -> Result<i64, StoreError> {
        self.ensure_open()?;
        validate_message(&message)?;
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.messages.push(ChatMessageRow {
            id,
            socket_id: message.connection_id.to_string(),
            username: message.username.to_string(),
            room: message.room.to_string(),
            message: message.text.to_string(),
            timestamp: message.timestamp_ms,
        });
        Ok(id)
    }

    async fn fetch_room_history(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.ensure_open()?;
        let rows: Vec<ChatMessageRow> = self
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| m.room == room)
            .cloned()
            .collect();

        Ok(newest_ascending(rows, |m| (m.timestamp, m.id), limit)
            .into_iter()
            .map(HistoryEntry::from)
            .collect())
    }

    async fn fetch_connection_logs(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<ConnectionLogEntry>, StoreError> {
        self.ensure_open()?;
        let rows: Vec<ConnectionLogRow> = self
            .tables
            .lock()
            .logs
            .iter()
            .filter(|l| l.room == room)
            .cloned()
            .collect();

        Ok(newest_ascending(rows, |l| (l.timestamp, l.id), limit)
            .into_iter()
            .filter_map(|l| {
                Some(ConnectionLogEntry {
                    action: ConnectionAction::parse(&l.action)?,
                    username: l.username,
                    timestamp: l.timestamp,
                })
            })
            .collect())
    }

    async fn fetch_user_messages(
        &self,
        username: &str,
        room: &str,
        limit: i64,
    ) -> Result<Vec<UserMessage>, StoreError> {
        self.ensure_open()?;
        let rows: Vec<ChatMessageRow> = self
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| m.room == room && m.username == username)
            .cloned()
            .collect();

        Ok(newest_ascending(rows, |m| (m.timestamp, m.id), limit)
            .into_iter()
            .map(|m| UserMessage {
                message: m.message,
                timestamp: m.timestamp,
            })
            .collect())
    }

    async fn fetch_statistics(&self) -> Result<Statistics, StoreError> {
        self.ensure_open()?;
        let tables = self.tables.lock();
        let rooms: HashSet<&str> = tables.messages.iter().map(|m| m.room.as_str()).collect();
        let users: HashSet<&str> = tables.messages.iter().map(|m| m.username.as_str()).collect();
        Ok(Statistics {
            total_messages: tables.messages.len() as i64,
            total_connections: tables.logs.len() as i64,
            active_rooms: rooms.len() as i64,
            total_users: users.len() as i64,
        })
    }

    async fn purge_older_than(
        &self,
        scope: PurgeScope<'_>,
        cutoff_ms: i64,
    ) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.lock();
        let before = tables.messages.len();
        tables.messages.retain(|m| {
            let in_scope = match scope {
                PurgeScope::Room(room) => m.room == room,
                PurgeScope::AllRooms => true,
            };
            !(in_scope && m.timestamp < cutoff_ms)
        });
        Ok((before - tables.messages.len()) as u64)
    }

    async fn purge_all_messages(&self, room: &str) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.lock();
        let before = tables.messages.len();
        tables.messages.retain(|m| m.room != room);
        Ok((before - tables.messages.len()) as u64)
    }

    async fn list_rooms_with_message_counts(&self) -> Result<Vec<RoomMessageCount>, StoreError> {
        self.ensure_open()?;
        let tables = self.tables.lock();
        let mut rooms: BTreeMap<&str, RoomMessageCount> = BTreeMap::new();
        for m in &tables.messages {
            let entry = rooms.entry(m.room.as_str()).or_insert_with(|| RoomMessageCount {
                room: m.room.clone(),
                count: 0,
                first_timestamp: None,
                last_timestamp: None,
            });
            entry.count += 1;
            entry.first_timestamp = Some(entry.first_timestamp.map_or(m.timestamp, |t| t.min(m.timestamp)));
            entry.last_timestamp = Some(entry.last_timestamp.map_or(m.timestamp, |t| t.max(m.timestamp)));
        }
        Ok(rooms.into_values().collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::info!("memory store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn message(store: &MemoryStore, room: &str, username: &str, text: &str, ts: i64) {
        store
            .record_message(NewChatMessage {
                connection_id: "conn_test",
                username,
                room,
                text,
                timestamp_ms: ts,
            })
            .await
            .unwrap();
    }

    async fn log(store: &MemoryStore, room: &str, action: ConnectionAction, ts: i64) {
        store
            .record_connection_event(NewConnectionEvent {
                connection_id: "conn_test",
                username: "alice",
                room,
                action,
                timestamp_ms: ts,
                source_address: Some("127.0.0.1"),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn history_is_newest_n_in_ascending_order() {
        let store = MemoryStore::new();
        message(&store, "r", "a", "third", 30).await;
        message(&store, "r", "a", "first", 10).await;
        message(&store, "r", "a", "second", 20).await;
        message(&store, "other", "a", "elsewhere", 15).await;

        let history = store.fetch_room_history("r", 2).await.unwrap();
        let texts: Vec<&str> = history.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "third"]);

        let all = store.fetch_room_history("r", 1000).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn record_ids_are_increasing() {
        let store = MemoryStore::new();
        let a = store
            .record_message(NewChatMessage {
                connection_id: "c",
                username: "u",
                room: "r",
                text: "t",
                timestamp_ms: 1,
            })
            .await
            .unwrap();
        let b = store
            .record_message(NewChatMessage {
                connection_id: "c",
                username: "u",
                room: "r",
                text: "t",
                timestamp_ms: 1,
            })
            .await
            .unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn purge_older_than_only_touches_messages_in_scope() {
        let store = MemoryStore::new();
        message(&store, "5", "a", "old", 100).await;
        message(&store, "5", "a", "new", 300).await;
        message(&store, "6", "a", "old elsewhere", 100).await;
        log(&store, "5", ConnectionAction::Join, 50).await;

        let deleted = store.purge_older_than(PurgeScope::Room("5"), 200).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.fetch_room_history("5", 100).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "new");
        assert_eq!(store.fetch_room_history("6", 100).await.unwrap().len(), 1);
        assert_eq!(store.fetch_connection_logs("5", 50).await.unwrap().len(), 1);

        let deleted = store.purge_older_than(PurgeScope::AllRooms, 200).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn purge_all_messages_empties_room() {
        let store = MemoryStore::new();
        message(&store, "tmp", "a", "x", 1).await;
        message(&store, "tmp", "b", "y", 2).await;
        message(&store, "keep", "a", "z", 3).await;

        assert_eq!(store.purge_all_messages("tmp").await.unwrap(), 2);
        assert_eq!(store.purge_all_messages("tmp").await.unwrap(), 0);
        assert_eq!(store.fetch_room_history("keep", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn statistics_and_room_listing() {
        let store = MemoryStore::new();
        message(&store, "a", "alice", "1", 10).await;
        message(&store, "a", "bob", "2", 20).await;
        message(&store, "b", "alice", "3", 5).await;
        log(&store, "a", ConnectionAction::Join, 1).await;
        log(&store, "a", ConnectionAction::Leave, 2).await;

        let stats = store.fetch_statistics().await.unwrap();
        assert_eq!(
            stats,
            Statistics {
                total_messages: 3,
                total_connections: 2,
                active_rooms: 2,
                total_users: 2,
            }
        );

        let rooms = store.list_rooms_with_message_counts().await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room, "a");
        assert_eq!(rooms[0].count, 2);
        assert_eq!(rooms[0].first_timestamp, Some(10));
        assert_eq!(rooms[0].last_timestamp, Some(20));
    }

    #[tokio::test]
    async fn user_messages_filter_by_user_and_room() {
        let store = MemoryStore::new();
        message(&store, "a", "alice", "mine", 10).await;
        message(&store, "a", "bob", "not mine", 11).await;
        message(&store, "b", "alice", "other room", 12).await;

        let msgs = store.fetch_user_messages("alice", "a", 50).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message, "mine");
    }

    #[tokio::test]
    async fn closed_store_fails() {
        let store = MemoryStore::new();
        store.close().await;
        let err = store.fetch_statistics().await.unwrap_err();
        assert!(matches!(err, StoreError::Failure(_)));
    }
}
