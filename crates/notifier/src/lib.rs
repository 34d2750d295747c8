//! Push delivery for chat notifications.
//!
//! The dispatcher talks to the push service only through [`PushDelivery`]: one batch call
//! per recipient, one [`DeliveryResult`] back per token, in input order. Raw service error
//! codes are turned into a [`FailureKind`](chatpush_common::types::FailureKind) here and
//! never leave this crate.

pub mod auth;
pub mod classify;
pub mod fcm;

use async_trait::async_trait;

use chatpush_common::error::AppError;
use chatpush_common::types::{DeliveryResult, PushMessage};

pub use auth::{ServiceAccountAuth, ServiceAccountKey, StaticToken, TokenSource};
pub use fcm::FcmClient;

/// A push service that accepts a batch of destination tokens for one message.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Send `message` to every token in `tokens`.
    ///
    /// Per-token failures are reported in the returned list, which has exactly one entry
    /// per input token. `Err` is reserved for failures that prevented the batch as a whole
    /// (e.g. no access token could be obtained).
    async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<DeliveryResult>, AppError>;
}
