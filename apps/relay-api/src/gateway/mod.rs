//! Real-time chat gateway: socket transport, room coordination and fan-out.
//!
//! Connections reach the service at `GET /socket` and exchange JSON frames of
//! the form `{"event": <name>, "data": <payload>}`.

pub mod coordinator;
pub mod directory;
pub mod events;
pub mod fanout;
pub mod server;
pub mod session;
pub mod validate;

pub use coordinator::RoomCoordinator;
pub use fanout::ConnectionHub;
