//! Document store access for chats and user profiles.
//!
//! Documents live as `JSONB` rows in `chats` and `users`. Reads go through the typed
//! boundary in [`crate::records`]; the only write is the token prune.

use async_trait::async_trait;
use sqlx::PgPool;

use chatpush_common::error::AppError;
use chatpush_common::types::{Chat, Lookup, UserProfile};

use crate::records::{chat_from_document, user_from_document};

/// Read chats and user profiles, and prune device tokens.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_chat(&self, chat_id: &str) -> Result<Lookup<Chat>, AppError>;

    async fn get_user(&self, user_id: &str) -> Result<Lookup<UserProfile>, AppError>;

    /// Remove exactly `tokens` from the user's `fcmTokens` in one atomic update.
    ///
    /// Elements not in `tokens` survive, including ones written concurrently by others.
    async fn remove_tokens(&self, user_id: &str, tokens: &[String]) -> Result<(), AppError>;
}

/// PostgreSQL-backed [`DocumentStore`].
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_document(
        &self,
        query: &'static str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(data,)| data))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Lookup<Chat>, AppError> {
        let doc = self
            .fetch_document("SELECT data FROM chats WHERE id = $1", chat_id)
            .await?;

        Ok(match doc {
            Some(doc) => chat_from_document(&doc),
            None => Lookup::Missing,
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<Lookup<UserProfile>, AppError> {
        let doc = self
            .fetch_document("SELECT data FROM users WHERE id = $1", user_id)
            .await?;

        Ok(match doc {
            Some(doc) => user_from_document(&doc),
            None => Lookup::Missing,
        })
    }

    async fn remove_tokens(&self, user_id: &str, tokens: &[String]) -> Result<(), AppError> {
        if tokens.is_empty() {
            return Ok(());
        }

        // The filtered array is computed from the row version the UPDATE locks, so tokens
        // appended by a concurrent writer are part of the input and kept.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET data = jsonb_set(
                    data,
                    '{fcmTokens}',
                    COALESCE(
                        (
                            SELECT jsonb_agg(elem ORDER BY ord)
                            FROM jsonb_array_elements(data->'fcmTokens') WITH ORDINALITY AS t(elem, ord)
                            WHERE jsonb_typeof(elem) <> 'string'
                               OR NOT (elem #>> '{}' = ANY($2))
                        ),
                        '[]'::jsonb
                    )
                ),
                updated_at = NOW()
            WHERE id = $1
              AND jsonb_typeof(data->'fcmTokens') = 'array'
            "#,
        )
        .bind(user_id)
        .bind(tokens)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                user_id,
                "Token prune matched no user document with a token array"
            );
        }

        Ok(())
    }
}
