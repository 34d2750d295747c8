use serde::{Deserialize, Serialize};

/// Display name used when a message carries no `senderUsername`.
pub const FALLBACK_SENDER_NAME: &str = "Someone";

/// `type` value in the data block of every chat notification.
pub const NEW_MESSAGE_TYPE: &str = "new_message";

/// Raw field map of a stored document, as delivered by the event source.
pub type DocumentFields = serde_json::Map<String, serde_json::Value>;

/// "Document created" trigger for `chats/{chat_id}/messages/{message_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreatedEvent {
    pub chat_id: String,
    pub message_id: String,
    /// Field values of the created record. `None` when the event carried no snapshot.
    pub data: Option<DocumentFields>,
}

/// A validated chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: String,
    pub text: String,
    /// Already resolved: falls back to "Someone" when absent or empty.
    pub sender_username: String,
}

/// A chat and its ordered participant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub users: Vec<String>,
}

/// The delivery-relevant part of a user document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub fcm_tokens: Vec<String>,
}

/// Outcome of reading a document through the typed read boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
    /// The document exists but does not fit the expected schema.
    Malformed(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Structured data block attached to a chat notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
}

/// Human-readable notification payload ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Sender display name
    pub title: String,
    /// Message text
    pub body: String,
    pub data: NotificationData,
}

impl NotificationPayload {
    /// Build the notification announcing `message` in `chat_id`.
    pub fn for_message(chat_id: &str, message: &ChatMessage) -> Self {
        Self {
            title: message.sender_username.clone(),
            body: message.text.clone(),
            data: NotificationData {
                kind: NEW_MESSAGE_TYPE.to_string(),
                chat_id: chat_id.to_string(),
                sender_id: message.sender_id.clone(),
            },
        }
    }
}

/// Delivery priority requested from the push service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Per-send delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub priority: Priority,
    /// Wake the app in the background on delivery.
    pub content_available: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: Priority::High,
            content_available: true,
        }
    }
}

/// A payload plus the options it is sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub payload: NotificationPayload,
    pub options: SendOptions,
}

/// Classification of a per-token delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The token no longer identifies an installed app and must be pruned.
    PermanentlyInvalid,
    /// Throttling, outages and transport errors.
    Transient,
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::PermanentlyInvalid => write!(f, "permanently_invalid"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why a single token could not be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub kind: FailureKind,
    /// Raw code reported by the push service, kept for logging only.
    pub code: String,
    pub message: String,
}

/// Result for one token of a batch send, positionally aligned with the input tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryResult {
    Delivered { message_id: Option<String> },
    Failed(DeliveryFailure),
}

impl DeliveryResult {
    pub fn is_permanently_invalid(&self) -> bool {
        matches!(
            self,
            DeliveryResult::Failed(DeliveryFailure {
                kind: FailureKind::PermanentlyInvalid,
                ..
            })
        )
    }
}

/// Last few characters of a device token, safe to put in logs.
pub fn token_suffix(token: &str) -> &str {
    let start = token
        .char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &token[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_for_message() {
        let message = ChatMessage {
            sender_id: "alice".to_string(),
            text: "hello".to_string(),
            sender_username: "Alice".to_string(),
        };
        let payload = NotificationPayload::for_message("c1", &message);
        assert_eq!(payload.title, "Alice");
        assert_eq!(payload.body, "hello");
        assert_eq!(payload.data.kind, "new_message");
        assert_eq!(payload.data.chat_id, "c1");
        assert_eq!(payload.data.sender_id, "alice");
    }

    #[test]
    fn test_notification_data_uses_camel_case_keys() {
        let data = NotificationData {
            kind: NEW_MESSAGE_TYPE.to_string(),
            chat_id: "c1".to_string(),
            sender_id: "alice".to_string(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "new_message", "chatId": "c1", "senderId": "alice"})
        );
    }

    #[test]
    fn test_default_send_options_are_high_priority_with_wake() {
        let options = SendOptions::default();
        assert_eq!(options.priority, Priority::High);
        assert!(options.content_available);
    }

    #[test]
    fn test_only_permanent_failures_are_prunable() {
        let failed = |kind| {
            DeliveryResult::Failed(DeliveryFailure {
                kind,
                code: "X".to_string(),
                message: String::new(),
            })
        };
        assert!(failed(FailureKind::PermanentlyInvalid).is_permanently_invalid());
        assert!(!failed(FailureKind::Transient).is_permanently_invalid());
        assert!(!failed(FailureKind::Unknown).is_permanently_invalid());
        assert!(!DeliveryResult::Delivered { message_id: None }.is_permanently_invalid());
    }

    #[test]
    fn test_token_suffix() {
        assert_eq!(token_suffix("abcdefghijkl"), "efghijkl");
        assert_eq!(token_suffix("short"), "short");
        assert_eq!(token_suffix(""), "");
    }
}
