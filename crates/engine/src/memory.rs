//! In-process [`DocumentStore`] holding raw JSON documents.
//!
//! Runs documents through the same read boundary as the PostgreSQL store and records every
//! call, which makes it the store of choice for dispatcher tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use chatpush_common::error::AppError;
use chatpush_common::types::{Chat, Lookup, UserProfile};

use crate::records::{chat_from_document, user_from_document};
use crate::store::DocumentStore;

/// A store operation, as recorded by [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetChat(String),
    GetUser(String),
    RemoveTokens(String, Vec<String>),
}

#[derive(Default)]
struct Documents {
    chats: HashMap<String, Value>,
    users: HashMap<String, Value>,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<Documents>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_chat(&self, chat_id: &str, doc: Value) {
        self.lock_docs().chats.insert(chat_id.to_string(), doc);
    }

    pub fn put_user(&self, user_id: &str, doc: Value) {
        self.lock_docs().users.insert(user_id.to_string(), doc);
    }

    /// Append a token the way a client registering a device would.
    pub fn add_token(&self, user_id: &str, token: &str) {
        let mut docs = self.lock_docs();
        let doc = docs
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if let Some(fields) = doc.as_object_mut() {
            let tokens = fields
                .entry("fcmTokens")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(tokens) = tokens.as_array_mut()
                && !tokens.iter().any(|t| t.as_str() == Some(token))
            {
                tokens.push(Value::String(token.to_string()));
            }
        }
    }

    /// Raw `fcmTokens` strings currently stored for a user.
    pub fn tokens(&self, user_id: &str) -> Vec<String> {
        self.lock_docs()
            .users
            .get(user_id)
            .and_then(|doc| doc.get("fcmTokens"))
            .and_then(Value::as_array)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn lock_docs(&self) -> std::sync::MutexGuard<'_, Documents> {
        // A poisoned lock only means another test thread panicked mid-insert.
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: StoreCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Lookup<Chat>, AppError> {
        self.record(StoreCall::GetChat(chat_id.to_string()));
        Ok(match self.lock_docs().chats.get(chat_id) {
            Some(doc) => chat_from_document(doc),
            None => Lookup::Missing,
        })
    }

    async fn get_user(&self, user_id: &str) -> Result<Lookup<UserProfile>, AppError> {
        self.record(StoreCall::GetUser(user_id.to_string()));
        Ok(match self.lock_docs().users.get(user_id) {
            Some(doc) => user_from_document(doc),
            None => Lookup::Missing,
        })
    }

    async fn remove_tokens(&self, user_id: &str, tokens: &[String]) -> Result<(), AppError> {
        self.record(StoreCall::RemoveTokens(user_id.to_string(), tokens.to_vec()));

        let mut docs = self.lock_docs();
        if let Some(existing) = docs
            .users
            .get_mut(user_id)
            .and_then(|doc| doc.get_mut("fcmTokens"))
            .and_then(Value::as_array_mut)
        {
            existing.retain(|t| match t.as_str() {
                Some(t) => !tokens.iter().any(|r| r == t),
                None => true,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_remove_tokens_is_set_difference() {
        let store = MemoryDocumentStore::new();
        store.put_user("bob", json!({"fcmTokens": ["t1", "t2", "t3"], "name": "Bob"}));

        store
            .remove_tokens("bob", &["t1".to_string(), "t3".to_string(), "zz".to_string()])
            .await
            .unwrap();

        assert_eq!(store.tokens("bob"), vec!["t2"]);
    }

    #[tokio::test]
    async fn test_remove_tokens_for_missing_user_is_noop() {
        let store = MemoryDocumentStore::new();
        store.remove_tokens("ghost", &["t1".to_string()]).await.unwrap();
        assert!(store.tokens("ghost").is_empty());
        assert_eq!(
            store.calls(),
            vec![StoreCall::RemoveTokens(
                "ghost".to_string(),
                vec!["t1".to_string()]
            )]
        );
    }

    #[test]
    fn test_add_token_creates_and_dedupes() {
        let store = MemoryDocumentStore::new();
        store.add_token("bob", "t1");
        store.add_token("bob", "t1");
        store.add_token("bob", "t2");
        assert_eq!(store.tokens("bob"), vec!["t1", "t2"]);
    }
}
