//! Shared application state for the Axum trigger host.

use std::sync::Arc;

use chatpush_common::config::AppConfig;
use chatpush_engine::NotificationDispatcher;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<NotificationDispatcher>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(dispatcher: NotificationDispatcher, config: AppConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            config,
        }
    }
}
