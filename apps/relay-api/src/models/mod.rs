pub mod connection_log;
pub mod message;
