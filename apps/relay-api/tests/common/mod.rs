#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;

use relay_api::config::Config;
use relay_api::store::{ChatStore, MemoryStore, NewChatMessage};
use relay_api::AppState;

pub const TEST_API_KEY: &str = "test-admin-key";

/// Build a test AppState over a fresh in-memory store. Background tasks are not started.
pub fn test_state() -> AppState {
    let config = Config {
        api_key: Some(TEST_API_KEY.to_string()),
        ..Config::default()
    };
    AppState::new(config, Arc::new(MemoryStore::new()))
}

/// Router with state applied, as `main` builds it minus the HTTP layers.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = relay_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Store a message directly, bypassing the socket path.
pub async fn seed_message(state: &AppState, room: &str, username: &str, text: &str, timestamp_ms: i64) {
    state
        .store
        .record_message(NewChatMessage {
            connection_id: "conn_seed",
            username,
            room,
            text,
            timestamp_ms,
        })
        .await
        .expect("seed message");
}

/// Let spawned connection-log and message writes reach the store.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
