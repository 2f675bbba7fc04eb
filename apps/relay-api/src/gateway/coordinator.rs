//! Room coordinator: the only writer of the session registry and room directory.
//!
//! All membership changes happen under a single lock that is never held across
//! an `.await`. Outbound events are queued while the lock is held, so every
//! member observes membership changes in the order they were applied.
//! Durability writes run on spawned tasks and never delay delivery.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::{clamp_limit, DEFAULT_HISTORY_LIMIT};
use crate::error::ChatError;
use crate::store::{now_ms, ChatStore, ConnectionAction, NewChatMessage, NewConnectionEvent};

use super::directory::RoomDirectory;
use super::events::{ChatBroadcast, ClientEvent, HistoryMessage, ServerEvent};
use super::fanout::ConnectionHub;
use super::session::{Session, SessionRegistry};
use super::validate;

#[derive(Default)]
struct RoomState {
    sessions: SessionRegistry,
    rooms: RoomDirectory,
}

impl RoomState {
    /// Usernames of `room` in join order.
    fn roster(&self, room: &str) -> Vec<String> {
        self.rooms
            .members(room)
            .iter()
            .filter_map(|conn| self.sessions.get(conn))
            .map(|session| session.username.clone())
            .collect()
    }

    fn username_taken(&self, room: &str, username: &str, except: &str) -> bool {
        self.rooms
            .members(room)
            .iter()
            .filter(|conn| conn.as_str() != except)
            .filter_map(|conn| self.sessions.get(conn))
            .any(|session| session.username == username)
    }

    fn evict(&mut self, connection_id: &str) -> Option<Session> {
        let session = self.sessions.remove(connection_id)?;
        self.rooms.remove_member(&session.room, connection_id);
        Some(session)
    }
}

struct RoomJoinedReply<'a> {
    username: &'a str,
    room: &'a str,
    history: Vec<HistoryMessage>,
}

pub struct RoomCoordinator {
    state: Mutex<RoomState>,
    store: Arc<dyn ChatStore>,
    hub: Arc<ConnectionHub>,
    history_limit: i64,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn ChatStore>, hub: Arc<ConnectionHub>, history_limit: i64) -> Self {
        Self {
            state: Mutex::new(RoomState::default()),
            store,
            hub,
            history_limit: clamp_limit(Some(history_limit), DEFAULT_HISTORY_LIMIT),
        }
    }

    /// Dispatch one inbound client event. Failures go back to the sender as an `error` event.
    pub async fn handle(&self, connection_id: &str, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinRoom(payload) => {
                self.join(connection_id, &payload.username, &payload.room).await
            }
            ClientEvent::ChatMessage(payload) => {
                self.send_message(connection_id, &payload.text, payload.time)
            }
            ClientEvent::LeaveRoom(payload) => {
                self.leave(connection_id, &payload.room);
                Ok(())
            }
        };

        if let Err(err) = result {
            tracing::debug!(conn_id = %connection_id, error = %err, "rejected client event");
            self.hub.send_to(connection_id, ServerEvent::error(err.to_string()));
        }
    }

    /// Bind `connection_id` to `username` inside `room`.
    ///
    /// A connection that already sits in another room leaves it first. The
    /// joiner receives `room joined` and `room history` before the room sees
    /// the new user list and the join notice. Every event is queued inside the
    /// same critical section that changes membership.
    pub async fn join(
        &self,
        connection_id: &str,
        username: &str,
        room: &str,
    ) -> Result<(), ChatError> {
        let username = validate::username(username)?;
        let room = validate::room(room)?;

        let history = self.load_history(room).await;
        let joined = RoomJoinedReply {
            username,
            room,
            history,
        };

        let previous = {
            let mut state = self.state.lock();

            let unchanged = state
                .sessions
                .get(connection_id)
                .is_some_and(|s| s.room == room && s.username == username);
            if unchanged {
                self.reply_joined(connection_id, joined);
                return Ok(());
            }

            if state.username_taken(room, username, connection_id) {
                return Err(ChatError::DuplicateIdentity {
                    username: username.to_string(),
                    room: room.to_string(),
                });
            }

            let previous = state.evict(connection_id);
            if let Some(previous) = &previous {
                self.notify_departure(&state, previous);
            }

            state.sessions.insert(Session {
                connection_id: connection_id.to_string(),
                username: username.to_string(),
                room: room.to_string(),
                joined_at: now_ms(),
            });
            state.rooms.add_member(room, connection_id);

            self.reply_joined(connection_id, joined);
            let members = state.rooms.members(room);
            self.hub
                .broadcast(members, ServerEvent::UserList(state.roster(room)), None);
            self.hub.broadcast(
                members,
                ServerEvent::SystemMessage {
                    message: format!("{username} joined the room"),
                },
                Some(connection_id),
            );
            previous
        };

        if let Some(previous) = previous {
            self.record_departure(&previous, ConnectionAction::Leave);
        }
        self.record_connection_event(connection_id, username, room, ConnectionAction::Join);

        tracing::info!(conn_id = %connection_id, username = %username, room = %room, "user joined room");
        Ok(())
    }

    /// Relay `text` to every member of the sender's room, the sender included.
    ///
    /// A null `time` is replaced with the server clock in Unix milliseconds.
    /// The message is persisted in the background.
    pub fn send_message(
        &self,
        connection_id: &str,
        text: &str,
        time: Value,
    ) -> Result<(), ChatError> {
        let timestamp = now_ms();
        let time = if time.is_null() {
            Value::from(timestamp)
        } else {
            time
        };

        let (session, text) = {
            let state = self.state.lock();
            let session = state
                .sessions
                .get(connection_id)
                .cloned()
                .ok_or(ChatError::NotJoined)?;
            let text = validate::message(text)?;
            self.hub.broadcast(
                state.rooms.members(&session.room),
                ServerEvent::ChatMessage(ChatBroadcast {
                    username: session.username.clone(),
                    text: text.to_string(),
                    time,
                    socket_id: connection_id.to_string(),
                }),
                None,
            );
            (session, text.to_string())
        };

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let message = NewChatMessage {
                connection_id: &session.connection_id,
                username: &session.username,
                room: &session.room,
                text: &text,
                timestamp_ms: timestamp,
            };
            if let Err(err) = store.record_message(message).await {
                tracing::warn!(room = %session.room, error = %err, "failed to persist chat message");
            }
        });
        Ok(())
    }

    /// Leave `room`. Ignored unless the connection's session is in that room.
    pub fn leave(&self, connection_id: &str, room: &str) {
        let room = room.trim();
        let removed = {
            let mut state = self.state.lock();
            let in_room = state
                .sessions
                .get(connection_id)
                .is_some_and(|session| session.room == room);
            if !in_room {
                return;
            }
            let removed = state.evict(connection_id);
            if let Some(session) = &removed {
                self.notify_departure(&state, session);
            }
            removed
        };

        if let Some(session) = removed {
            self.record_departure(&session, ConnectionAction::Leave);
            tracing::info!(conn_id = %connection_id, room = %session.room, "user left room");
        }
    }

    /// Transport-level loss of the connection.
    pub fn disconnect(&self, connection_id: &str) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.evict(connection_id);
            if let Some(session) = &removed {
                self.notify_departure(&state, session);
            }
            removed
        };

        if let Some(session) = removed {
            self.record_departure(&session, ConnectionAction::Disconnect);
            tracing::info!(conn_id = %connection_id, room = %session.room, "user disconnected");
        }
    }

    /// Drop sessions whose transport connection is gone. Writes nothing and
    /// notifies nobody. Returns how many sessions were evicted.
    pub fn reap_orphans(&self) -> usize {
        let mut state = self.state.lock();
        let orphans: Vec<String> = state
            .sessions
            .connection_ids()
            .filter(|conn| !self.hub.is_connected(conn))
            .map(str::to_owned)
            .collect();

        for conn in &orphans {
            state.evict(conn);
        }
        orphans.len()
    }

    /// Point-in-time snapshot of rooms with at least one member.
    pub fn active_rooms(&self) -> Vec<String> {
        self.state.lock().rooms.room_names()
    }

    /// Usernames currently in `room`, in join order.
    pub fn presence(&self, room: &str) -> Vec<String> {
        self.state.lock().roster(room)
    }

    pub fn session(&self, connection_id: &str) -> Option<Session> {
        self.state.lock().sessions.get(connection_id).cloned()
    }

    pub fn online_users(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn online_rooms(&self) -> usize {
        self.state.lock().rooms.len()
    }

    async fn load_history(&self, room: &str) -> Vec<HistoryMessage> {
        match self.store.fetch_room_history(room, self.history_limit).await {
            Ok(entries) => entries.into_iter().map(HistoryMessage::from).collect(),
            Err(err) => {
                tracing::warn!(room = %room, error = %err, "failed to load room history");
                Vec::new()
            }
        }
    }

    fn reply_joined(&self, connection_id: &str, reply: RoomJoinedReply<'_>) {
        self.hub.send_to(
            connection_id,
            ServerEvent::RoomJoined {
                username: reply.username.to_string(),
                room: reply.room.to_string(),
            },
        );
        self.hub
            .send_to(connection_id, ServerEvent::RoomHistory(reply.history));
    }

    /// Tell the members still in the session's room that it left. The session
    /// must already be evicted from `state`.
    fn notify_departure(&self, state: &RoomState, session: &Session) {
        self.hub.broadcast(
            state.rooms.members(&session.room),
            ServerEvent::UserLeft {
                username: session.username.clone(),
            },
            Some(&session.connection_id),
        );
    }

    fn record_departure(&self, session: &Session, action: ConnectionAction) {
        self.record_connection_event(
            &session.connection_id,
            &session.username,
            &session.room,
            action,
        );
    }

    /// Queue a connection log write. Failures are logged and dropped.
    fn record_connection_event(
        &self,
        connection_id: &str,
        username: &str,
        room: &str,
        action: ConnectionAction,
    ) {
        let store = Arc::clone(&self.store);
        let source_address = self.hub.source_address(connection_id);
        let timestamp_ms = now_ms();
        let connection_id = connection_id.to_string();
        let username = username.to_string();
        let room = room.to_string();

        tokio::spawn(async move {
            let event = NewConnectionEvent {
                connection_id: &connection_id,
                username: &username,
                room: &room,
                action,
                timestamp_ms,
                source_address: source_address.as_deref(),
            };
            if let Err(err) = store.record_connection_event(event).await {
                tracing::warn!(
                    conn_id = %connection_id,
                    room = %room,
                    action = action.as_str(),
                    error = %err,
                    "failed to record connection event"
                );
            }
        });
    }
}
