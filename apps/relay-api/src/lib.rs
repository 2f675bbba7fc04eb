pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod retention;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use gateway::{ConnectionHub, RoomCoordinator};
use retention::RetentionScheduler;
use store::ChatStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub hub: Arc<ConnectionHub>,
    pub coordinator: Arc<RoomCoordinator>,
    pub retention: Arc<RetentionScheduler>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the coordinator and scheduler around `store`. Background tasks are not started.
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let coordinator = Arc::new(RoomCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            config.history_limit,
        ));
        let retention = Arc::new(RetentionScheduler::new(
            Arc::clone(&store),
            Arc::clone(&coordinator),
            &config,
        ));

        Self {
            store,
            hub,
            coordinator,
            retention,
            config: Arc::new(config),
        }
    }
}
