//! Notification dispatcher.
//!
//! Invoked once per newly created chat message:
//! 1. Validate the message fields (sender id and text are required)
//! 2. Skip redeliveries of the same message (when a guard is configured)
//! 3. Load the chat's participant list
//! 4. For every participant except the sender: load their tokens, send one batch,
//!    prune the tokens the push service reports as permanently invalid
//!
//! Precondition failures end the smallest affected unit of work quietly. Store and push
//! errors end the invocation and are logged; nothing is returned as an error or retried.

use std::sync::Arc;

use serde::Serialize;

use chatpush_common::error::AppError;
use chatpush_common::types::{
    ChatMessage, DeliveryResult, Lookup, MessageCreatedEvent, NotificationPayload, PushMessage,
    SendOptions, token_suffix,
};
use chatpush_notifier::PushDelivery;

use crate::guard::InvocationGuard;
use crate::records::parse_message;
use crate::store::DocumentStore;

/// Why an invocation ended without notifying anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The trigger carried no document snapshot.
    NoData,
    /// `senderId` or `text` was absent or empty.
    MissingFields,
    /// The message was already claimed by an earlier delivery.
    Duplicate,
    ChatNotFound,
    /// The chat's `users` field is absent or not a list of ids.
    ChatMalformed,
}

/// Why a single recipient got no batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientSkip {
    NotFound,
    /// The user document is not an object.
    Malformed,
    NoTokens,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecipient {
    pub recipient_id: String,
    pub reason: RecipientSkip,
}

/// Per-invocation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Recipients a batch was sent to.
    pub recipients_notified: u32,
    /// Recipients with no profile or no tokens.
    pub recipients_skipped: u32,
    pub tokens_targeted: u32,
    pub tokens_delivered: u32,
    pub tokens_removed: u32,
    /// One entry per skipped recipient, in chat order.
    pub skipped: Vec<SkippedRecipient>,
}

impl DispatchSummary {
    fn skip(&mut self, recipient_id: &str, reason: RecipientSkip) {
        self.recipients_skipped += 1;
        self.skipped.push(SkippedRecipient {
            recipient_id: recipient_id.to_string(),
            reason,
        });
    }
}

/// What a single invocation did. Never an error from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Skipped {
        reason: SkipReason,
    },
    Completed {
        summary: DispatchSummary,
    },
    /// A store or push call failed; `summary` covers the recipients handled before it.
    Aborted {
        error: String,
        summary: DispatchSummary,
    },
}

/// Fans a new chat message out to the other participants' devices.
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    push: Arc<dyn PushDelivery>,
    guard: Option<Arc<dyn InvocationGuard>>,
    options: SendOptions,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, push: Arc<dyn PushDelivery>) -> Self {
        Self {
            store,
            push,
            guard: None,
            options: SendOptions::default(),
        }
    }

    /// Filter redelivered triggers through `guard`.
    pub fn with_guard(mut self, guard: Arc<dyn InvocationGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Handle one "message created" trigger.
    pub async fn on_message_created(&self, event: &MessageCreatedEvent) -> DispatchOutcome {
        let chat_id = event.chat_id.as_str();
        let message_id = event.message_id.as_str();

        let Some(fields) = &event.data else {
            tracing::info!(chat_id, message_id, "No data associated with the event");
            return DispatchOutcome::Skipped {
                reason: SkipReason::NoData,
            };
        };

        let message = match parse_message(fields) {
            Ok(message) => message,
            Err(rejection) => {
                tracing::info!(chat_id, message_id, reason = %rejection, "Skipping message");
                return DispatchOutcome::Skipped {
                    reason: SkipReason::MissingFields,
                };
            }
        };

        tracing::info!(
            chat_id,
            message_id,
            sender_id = %message.sender_id,
            sender_username = %message.sender_username,
            "New chat message"
        );

        if let Some(guard) = &self.guard {
            match guard.claim(chat_id, message_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(chat_id, message_id, "Duplicate trigger, already dispatched");
                    return DispatchOutcome::Skipped {
                        reason: SkipReason::Duplicate,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        chat_id,
                        message_id,
                        error = %e,
                        "Duplicate check failed, dispatching anyway"
                    );
                }
            }
        }

        let mut summary = DispatchSummary::default();
        match self.fan_out(chat_id, &message, &mut summary).await {
            Ok(Some(reason)) => DispatchOutcome::Skipped { reason },
            Ok(None) => {
                tracing::info!(
                    chat_id,
                    message_id,
                    notified = summary.recipients_notified,
                    skipped = summary.recipients_skipped,
                    removed = summary.tokens_removed,
                    "Notifications processing complete"
                );
                DispatchOutcome::Completed { summary }
            }
            Err(e) => {
                tracing::error!(
                    chat_id,
                    message_id,
                    error = %e,
                    "Error processing new chat message"
                );
                DispatchOutcome::Aborted {
                    error: e.to_string(),
                    summary,
                }
            }
        }
    }

    /// Notify every participant but the sender. `Ok(Some(_))` means the chat was unusable.
    async fn fan_out(
        &self,
        chat_id: &str,
        message: &ChatMessage,
        summary: &mut DispatchSummary,
    ) -> Result<Option<SkipReason>, AppError> {
        let chat = match self.store.get_chat(chat_id).await? {
            Lookup::Found(chat) => chat,
            Lookup::Missing => {
                tracing::info!(chat_id, "Chat document not found");
                return Ok(Some(SkipReason::ChatNotFound));
            }
            Lookup::Malformed(reason) => {
                tracing::info!(chat_id, reason = %reason, "Invalid chat document");
                return Ok(Some(SkipReason::ChatMalformed));
            }
        };

        let push_message = PushMessage {
            payload: NotificationPayload::for_message(chat_id, message),
            options: self.options,
        };

        for recipient_id in &chat.users {
            if *recipient_id == message.sender_id {
                continue;
            }
            self.notify_recipient(recipient_id, &push_message, summary)
                .await?;
        }

        Ok(None)
    }

    async fn notify_recipient(
        &self,
        recipient_id: &str,
        message: &PushMessage,
        summary: &mut DispatchSummary,
    ) -> Result<(), AppError> {
        tracing::debug!(recipient_id, "Preparing notification");

        let profile = match self.store.get_user(recipient_id).await? {
            Lookup::Found(profile) => profile,
            Lookup::Missing => {
                tracing::info!(recipient_id, "Recipient user document not found");
                summary.skip(recipient_id, RecipientSkip::NotFound);
                return Ok(());
            }
            Lookup::Malformed(reason) => {
                tracing::info!(recipient_id, reason = %reason, "Invalid recipient user document");
                summary.skip(recipient_id, RecipientSkip::Malformed);
                return Ok(());
            }
        };

        let tokens = profile.fcm_tokens;
        if tokens.is_empty() {
            tracing::info!(recipient_id, "No valid FCM tokens for recipient");
            summary.skip(recipient_id, RecipientSkip::NoTokens);
            return Ok(());
        }

        tracing::info!(recipient_id, token_count = tokens.len(), "Sending notification");
        let results = self.push.send_batch(&tokens, message).await?;
        summary.recipients_notified += 1;
        summary.tokens_targeted += tokens.len() as u32;

        if results.len() != tokens.len() {
            tracing::warn!(
                recipient_id,
                tokens = tokens.len(),
                results = results.len(),
                "Push result count does not match token count"
            );
        }

        let mut invalid = Vec::new();
        for (token, result) in tokens.iter().zip(&results) {
            match result {
                DeliveryResult::Delivered { .. } => summary.tokens_delivered += 1,
                DeliveryResult::Failed(failure) => {
                    tracing::warn!(
                        recipient_id,
                        token = %token_suffix(token),
                        kind = %failure.kind,
                        code = %failure.code,
                        error = %failure.message,
                        "Failure sending to token"
                    );
                    if result.is_permanently_invalid() {
                        invalid.push(token.clone());
                    }
                }
            }
        }

        if !invalid.is_empty() {
            tracing::info!(recipient_id, removed = invalid.len(), "Removing invalid tokens");
            self.store.remove_tokens(recipient_id, &invalid).await?;
            summary.tokens_removed += invalid.len() as u32;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = DispatchOutcome::Skipped {
            reason: SkipReason::ChatMalformed,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"outcome": "skipped", "reason": "chat_malformed"})
        );

        let outcome = DispatchOutcome::Completed {
            summary: DispatchSummary {
                recipients_notified: 1,
                tokens_targeted: 2,
                tokens_delivered: 1,
                tokens_removed: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["summary"]["tokens_removed"], 1);
        assert_eq!(json["summary"]["skipped"], serde_json::json!([]));
    }

    #[test]
    fn test_skipped_recipient_serializes_reason() {
        let mut summary = DispatchSummary::default();
        summary.skip("carol", RecipientSkip::NotFound);
        summary.skip("dave", RecipientSkip::NoTokens);

        assert_eq!(summary.recipients_skipped, 2);
        assert_eq!(
            serde_json::to_value(&summary.skipped).unwrap(),
            serde_json::json!([
                {"recipient_id": "carol", "reason": "not_found"},
                {"recipient_id": "dave", "reason": "no_tokens"}
            ])
        );
    }
}
