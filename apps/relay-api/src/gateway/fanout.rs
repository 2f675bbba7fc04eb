//! Delivery of server events to live connections.
//!
//! Each socket task registers an unbounded channel here and forwards whatever
//! arrives on it. Sends never wait on the socket, so a slow client only grows
//! its own queue.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::ServerEvent;

pub type EventReceiver = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<Arc<ServerEvent>>,
    source_address: Option<String>,
}

/// Live transport connections, keyed by connection id.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<String, ConnectionEntry>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly upgraded connection and return its outbound queue.
    pub fn register(&self, connection_id: &str, source_address: Option<String>) -> EventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                sender,
                source_address,
            },
        );
        receiver
    }

    pub fn unregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    /// Whether the transport still holds this connection open.
    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|entry| !entry.sender.is_closed())
    }

    pub fn source_address(&self, connection_id: &str) -> Option<String> {
        self.connections
            .get(connection_id)
            .and_then(|entry| entry.source_address.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue `event` for a single connection.
    pub fn send_to(&self, connection_id: &str, event: ServerEvent) {
        self.deliver(connection_id, &Arc::new(event));
    }

    /// Queue `event` for every listed member except `except`.
    pub fn broadcast(&self, members: &[String], event: ServerEvent, except: Option<&str>) {
        let event = Arc::new(event);
        for member in members {
            if Some(member.as_str()) == except {
                continue;
            }
            self.deliver(member, &event);
        }
    }

    fn deliver(&self, connection_id: &str, event: &Arc<ServerEvent>) {
        let Some(entry) = self.connections.get(connection_id) else {
            tracing::debug!(conn_id = %connection_id, "dropping event for unknown connection");
            return;
        };
        if entry.sender.send(Arc::clone(event)).is_err() {
            tracing::debug!(conn_id = %connection_id, "dropping event for closed connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(text: &str) -> ServerEvent {
        ServerEvent::SystemMessage {
            message: text.to_string(),
        }
    }

    #[test]
    fn broadcast_skips_excluded_member() {
        let hub = ConnectionHub::new();
        let mut a = hub.register("a", None);
        let mut b = hub.register("b", None);

        hub.broadcast(&["a".to_string(), "b".to_string()], notice("hi"), Some("a"));

        assert!(a.try_recv().is_err());
        assert_eq!(*b.try_recv().unwrap(), notice("hi"));
    }

    #[test]
    fn send_to_unknown_connection_is_ignored() {
        let hub = ConnectionHub::new();
        hub.send_to("ghost", notice("hello?"));
        assert!(hub.is_empty());
    }

    #[test]
    fn dropped_receiver_counts_as_disconnected() {
        let hub = ConnectionHub::new();
        let rx = hub.register("a", Some("10.0.0.1".to_string()));
        assert!(hub.is_connected("a"));
        assert_eq!(hub.source_address("a").as_deref(), Some("10.0.0.1"));

        drop(rx);
        assert!(!hub.is_connected("a"));

        hub.unregister("a");
        assert!(!hub.is_connected("a"));
        assert_eq!(hub.len(), 0);
    }
}
