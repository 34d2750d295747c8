//! Duplicate-delivery guard: Redis-backed per-message claims.
//!
//! Event sources deliver "document created" triggers at least once. The first invocation for
//! a `(chat, message)` pair claims it; redeliveries within the TTL find the claim and skip
//! the fan-out.
//!
//! Uses Redis `SET NX EX` for atomic check-and-set with automatic TTL expiry.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use chatpush_common::error::AppError;

/// Default claim lifetime in seconds (1 hour).
pub const DEFAULT_CLAIM_TTL_SECONDS: u64 = 3600;

/// Claims a message so it is dispatched once.
#[async_trait]
pub trait InvocationGuard: Send + Sync {
    /// Returns `true` if this call claimed the message, `false` if it was already claimed.
    async fn claim(&self, chat_id: &str, message_id: &str) -> Result<bool, AppError>;
}

/// Redis-backed guard.
pub struct RedisInvocationGuard {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisInvocationGuard {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    fn key(chat_id: &str, message_id: &str) -> String {
        format!("chatpush:dispatched:{}:{}", chat_id, message_id)
    }
}

#[async_trait]
impl InvocationGuard for RedisInvocationGuard {
    async fn claim(&self, chat_id: &str, message_id: &str) -> Result<bool, AppError> {
        let key = Self::key(chat_id, message_id);
        let mut redis = self.redis.clone();

        // SET key "1" NX EX ttl
        // Returns Some("OK") if the key was set (first delivery)
        // Returns None if the key already exists (redelivery)
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut redis)
            .await?;

        let claimed = result.is_some();
        if !claimed {
            tracing::debug!(chat_id, message_id, "Message already claimed by an earlier delivery");
        }

        Ok(claimed)
    }
}
