//! Session registry: which chat identity each live connection holds.

use std::collections::HashMap;

/// A connection bound to a username inside one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: String,
    pub username: String,
    pub room: String,
    /// Unix milliseconds at which the join was accepted.
    pub joined_at: i64,
}

/// Connection id → session. At most one session per connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `session.connection_id`, returning the replaced one.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.connection_id.clone(), session)
    }

    pub fn get(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn remove(&mut self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}
