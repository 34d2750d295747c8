//! Typed read boundary for loosely-typed stored documents.
//!
//! Documents arrive as arbitrary JSON. Everything downstream works with the typed records
//! produced here, or with the `Malformed` outcome describing why a document was rejected.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use chatpush_common::types::{
    Chat, ChatMessage, DocumentFields, FALLBACK_SENDER_NAME, Lookup, UserProfile,
};

/// A created message lacked a field the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message is missing {}", .missing.join(", "))]
pub struct MessageRejection {
    pub missing: Vec<&'static str>,
}

/// A string field that is present and non-empty.
fn non_empty_str<'a>(fields: &'a DocumentFields, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Validate the field map of a newly created message.
pub fn parse_message(fields: &DocumentFields) -> Result<ChatMessage, MessageRejection> {
    let sender_id = non_empty_str(fields, "senderId");
    let text = non_empty_str(fields, "text");

    match (sender_id, text) {
        (Some(sender_id), Some(text)) => Ok(ChatMessage {
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            sender_username: non_empty_str(fields, "senderUsername")
                .unwrap_or(FALLBACK_SENDER_NAME)
                .to_string(),
        }),
        (sender_id, text) => {
            let mut missing = Vec::new();
            if sender_id.is_none() {
                missing.push("senderId");
            }
            if text.is_none() {
                missing.push("text");
            }
            Err(MessageRejection { missing })
        }
    }
}

/// Validate a chat document. The participant list must be an array of strings.
pub fn chat_from_document(doc: &Value) -> Lookup<Chat> {
    let Some(fields) = doc.as_object() else {
        return Lookup::Malformed("chat document is not an object".to_string());
    };

    let users = match fields.get("users") {
        None | Some(Value::Null) => return Lookup::Malformed("missing users".to_string()),
        Some(Value::Array(users)) => users,
        Some(_) => return Lookup::Malformed("users is not an array".to_string()),
    };

    let mut ids = Vec::with_capacity(users.len());
    for (i, user) in users.iter().enumerate() {
        match user.as_str() {
            Some(id) => ids.push(id.to_string()),
            None => return Lookup::Malformed(format!("users[{}] is not a string", i)),
        }
    }

    Lookup::Found(Chat { users: ids })
}

/// Validate a user document.
///
/// A missing or non-array `fcmTokens` yields a profile with no tokens. Elements that are
/// not non-empty strings are ignored, and repeated tokens are kept once in first-seen order.
pub fn user_from_document(doc: &Value) -> Lookup<UserProfile> {
    let Some(fields) = doc.as_object() else {
        return Lookup::Malformed("user document is not an object".to_string());
    };

    let fcm_tokens = fields
        .get("fcmTokens")
        .and_then(Value::as_array)
        .map(|tokens| {
            let mut seen = HashSet::new();
            tokens
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| !t.is_empty() && seen.insert(*t))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Lookup::Found(UserProfile { fcm_tokens })
}
