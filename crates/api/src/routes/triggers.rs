//! Document-created trigger deliveries.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use chatpush_common::types::{DocumentFields, MessageCreatedEvent};
use chatpush_engine::DispatchOutcome;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/triggers/chats/{chat_id}/messages/{message_id}",
        post(message_created),
    )
}

/// The created document's fields from a trigger body shaped `{"data": {...}}`.
///
/// Anything else, including an empty or non-JSON body, means the source sent no snapshot.
fn snapshot(body: &[u8]) -> Option<DocumentFields> {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Trigger body is not JSON");
            return None;
        }
    };
    value.get("data").and_then(Value::as_object).cloned()
}

/// POST /triggers/chats/:chat_id/messages/:message_id: a chat message was created.
///
/// Answers `200` whatever the dispatcher decided, so the event source does not redeliver.
/// The body is read without a content-type check for the same reason.
async fn message_created(
    State(state): State<AppState>,
    auth: TriggerAuth,
    Path((chat_id, message_id)): Path<(String, String)>,
    body: Bytes,
) -> Json<DispatchOutcome> {
    let event = MessageCreatedEvent {
        chat_id,
        message_id,
        data: snapshot(&body),
    };

    let outcome = state.dispatcher.on_message_created(&event).await;

    tracing::debug!(
        chat_id = %event.chat_id,
        message_id = %event.message_id,
        source = auth.source.as_deref().unwrap_or("unauthenticated"),
        outcome = ?outcome,
        "Trigger handled"
    );

    Json(outcome)
}
