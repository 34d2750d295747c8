//! Liveness check for the hosting platform.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "chatpush-api",
        "version": env!("CARGO_PKG_VERSION"),
        "trigger_auth": state.config.trigger_jwt_secret.is_some(),
        "dedupe": state.config.redis_url.is_some(),
    }))
}
