//! Firebase Cloud Messaging HTTP v1 client.
//!
//! The v1 API takes one destination token per request, so a batch is sent as concurrent
//! per-token requests whose results are collected back in input order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;

use chatpush_common::error::AppError;
use chatpush_common::types::{
    DeliveryFailure, DeliveryResult, FailureKind, Priority, PushMessage, token_suffix,
};

use crate::PushDelivery;
use crate::auth::TokenSource;
use crate::classify::{classify_code, classify_status};

const FCM_ERROR_TYPE: &str = "type.googleapis.com/google.firebase.fcm.v1.FcmError";

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "@type", default)]
    type_url: String,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

impl ErrorStatus {
    /// The FCM-specific error code if present, otherwise the canonical status name.
    fn code(&self) -> &str {
        self.details
            .iter()
            .find(|d| d.type_url == FCM_ERROR_TYPE)
            .and_then(|d| d.error_code.as_deref())
            .unwrap_or(self.status.as_str())
    }
}

/// FCM v1 [`PushDelivery`] implementation.
pub struct FcmClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    send_url: String,
}

impl FcmClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        endpoint: &str,
        project_id: &str,
    ) -> Self {
        Self {
            http,
            tokens,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                endpoint.trim_end_matches('/'),
                project_id
            ),
        }
    }

    /// HTTP client configured with the per-request timeout.
    pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, AppError> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?)
    }

    /// Build the v1 `messages:send` body for one destination token.
    pub fn request_body(token: &str, message: &PushMessage) -> serde_json::Value {
        let payload = &message.payload;
        let (android_priority, apns_priority) = match message.options.priority {
            Priority::High => ("HIGH", "10"),
            Priority::Normal => ("NORMAL", "5"),
        };

        let mut aps = serde_json::Map::new();
        if message.options.content_available {
            aps.insert("content-available".to_string(), json!(1));
        }

        json!({
            "message": {
                "token": token,
                "notification": {
                    "title": payload.title,
                    "body": payload.body,
                },
                "data": payload.data,
                "android": { "priority": android_priority },
                "apns": {
                    "headers": { "apns-priority": apns_priority },
                    "payload": { "aps": aps },
                },
            }
        })
    }

    async fn send_one(&self, bearer: &str, token: &str, message: &PushMessage) -> DeliveryResult {
        let suffix = token_suffix(token);
        let body = Self::request_body(token, message);

        let response = match self
            .http
            .post(&self.send_url)
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(token = %suffix, error = %e, "FCM request failed");
                return DeliveryResult::Failed(DeliveryFailure {
                    kind: FailureKind::Transient,
                    code: "transport".to_string(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        if (200..300).contains(&status) {
            let message_id = serde_json::from_str::<SendResponse>(&text)
                .ok()
                .and_then(|r| r.name);
            tracing::debug!(token = %suffix, "FCM push accepted");
            return DeliveryResult::Delivered { message_id };
        }

        let error = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error)
            .unwrap_or_default();
        let code = error.code().to_string();
        let kind = match classify_code(&code, &error.message) {
            FailureKind::Unknown => classify_status(status),
            kind => kind,
        };

        tracing::debug!(token = %suffix, status, code = %code, kind = %kind, "FCM push rejected");

        DeliveryResult::Failed(DeliveryFailure {
            kind,
            code: if code.is_empty() {
                format!("HTTP {}", status)
            } else {
                code
            },
            message: if error.message.is_empty() {
                text
            } else {
                error.message
            },
        })
    }
}

#[async_trait]
impl PushDelivery for FcmClient {
    async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<DeliveryResult>, AppError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let bearer = self
            .tokens
            .access_token()
            .await
            .map_err(|e| AppError::Push(format!("No FCM access token: {}", e)))?;
        let results = join_all(
            tokens
                .iter()
                .map(|token| self.send_one(&bearer, token, message)),
        )
        .await;

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::response::IntoResponse;

    use chatpush_common::types::{NotificationData, NotificationPayload, SendOptions};

    use super::*;
    use crate::auth::StaticToken;

    #[derive(Clone, Default)]
    struct Seen {
        requests: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    async fn fake_fcm(
        State(seen): State<Seen>,
        uri: Uri,
        headers: HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> axum::response::Response {
        let token = body["message"]["token"].as_str().unwrap_or_default().to_string();
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        seen.requests
            .lock()
            .unwrap()
            .push((uri.path().to_string(), auth, token.clone()));

        match token.as_str() {
            "dead" => (
                StatusCode::NOT_FOUND,
                axum::Json(json!({"error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND",
                    "details": [{"@type": FCM_ERROR_TYPE, "errorCode": "UNREGISTERED"}]
                }})),
            )
                .into_response(),
            "busy" => (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(json!({"error": {
                    "code": 429,
                    "message": "Quota exceeded.",
                    "status": "RESOURCE_EXHAUSTED",
                    "details": [{"@type": FCM_ERROR_TYPE, "errorCode": "QUOTA_EXCEEDED"}]
                }})),
            )
                .into_response(),
            "html404" => (StatusCode::NOT_FOUND, "<html>Not Found</html>").into_response(),
            "notfound" => (
                StatusCode::NOT_FOUND,
                axum::Json(json!({"error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND"
                }})),
            )
                .into_response(),
            "garbled" => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({"error": {
                    "code": 400,
                    "message": "The registration token is not a valid FCM registration token",
                    "status": "INVALID_ARGUMENT",
                    "details": [{"@type": FCM_ERROR_TYPE, "errorCode": "INVALID_ARGUMENT"}]
                }})),
            )
                .into_response(),
            _ => axum::Json(json!({"name": format!("projects/demo/messages/{}", token)}))
                .into_response(),
        }
    }

    async fn spawn_fake_fcm() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new().fallback(fake_fcm).with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn message() -> PushMessage {
        PushMessage {
            payload: NotificationPayload {
                title: "Alice".to_string(),
                body: "hi bob".to_string(),
                data: NotificationData {
                    kind: "new_message".to_string(),
                    chat_id: "c1".to_string(),
                    sender_id: "alice".to_string(),
                },
            },
            options: SendOptions::default(),
        }
    }

    fn client(endpoint: &str) -> FcmClient {
        FcmClient::new(
            reqwest::Client::new(),
            Arc::new(StaticToken("test-token".to_string())),
            endpoint,
            "demo",
        )
    }

    #[test]
    fn test_request_body_shape() {
        let body = FcmClient::request_body("tok", &message());
        let msg = &body["message"];
        assert_eq!(msg["token"], "tok");
        assert_eq!(msg["notification"]["title"], "Alice");
        assert_eq!(msg["notification"]["body"], "hi bob");
        assert_eq!(msg["data"]["type"], "new_message");
        assert_eq!(msg["data"]["chatId"], "c1");
        assert_eq!(msg["data"]["senderId"], "alice");
        assert_eq!(msg["android"]["priority"], "HIGH");
        assert_eq!(msg["apns"]["headers"]["apns-priority"], "10");
        assert_eq!(msg["apns"]["payload"]["aps"]["content-available"], 1);
    }

    #[tokio::test]
    async fn test_send_batch_results_follow_input_order() {
        let (endpoint, seen) = spawn_fake_fcm().await;
        let client = client(&endpoint);
        let tokens: Vec<String> = ["ok1", "dead", "busy", "garbled", "ok2"]
            .iter()
            .map(|t| t.to_string())
            .collect();

        let results = client.send_batch(&tokens, &message()).await.unwrap();
        assert_eq!(results.len(), 5);

        assert_eq!(
            results[0],
            DeliveryResult::Delivered {
                message_id: Some("projects/demo/messages/ok1".to_string())
            }
        );
        assert!(results[1].is_permanently_invalid());
        match &results[2] {
            DeliveryResult::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Transient);
                assert_eq!(f.code, "QUOTA_EXCEEDED");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(results[3].is_permanently_invalid());
        assert!(matches!(results[4], DeliveryResult::Delivered { .. }));

        let requests = seen.requests.lock().unwrap();
        assert_eq!(requests.len(), 5);
        for (path, auth, _) in requests.iter() {
            assert_eq!(path, "/v1/projects/demo/messages:send");
            assert_eq!(auth, "Bearer test-token");
        }
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_requests() {
        let (endpoint, seen) = spawn_fake_fcm().await;
        let results = client(&endpoint).send_batch(&[], &message()).await.unwrap();
        assert!(results.is_empty());
        assert!(seen.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bare_404_keeps_token() {
        let (endpoint, _seen) = spawn_fake_fcm().await;
        let tokens = vec!["html404".to_string(), "notfound".to_string()];

        let results = client(&endpoint)
            .send_batch(&tokens, &message())
            .await
            .unwrap();

        match &results[0] {
            DeliveryResult::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Unknown);
                assert_eq!(f.code, "HTTP 404");
                assert_eq!(f.message, "<html>Not Found</html>");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        match &results[1] {
            DeliveryResult::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Unknown);
                assert_eq!(f.code, "NOT_FOUND");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(results.iter().all(|r| !r.is_permanently_invalid()));
    }

    struct NoToken;

    #[async_trait]
    impl TokenSource for NoToken {
        async fn access_token(&self) -> Result<String, AppError> {
            Err(AppError::Auth("token exchange rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_missing_access_token_fails_whole_batch() {
        let (endpoint, seen) = spawn_fake_fcm().await;
        let client = FcmClient::new(reqwest::Client::new(), Arc::new(NoToken), &endpoint, "demo");

        let err = client
            .send_batch(&["t1".to_string()], &message())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Push(_)));
        assert!(seen.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_transient() {
        let client = client("http://127.0.0.1:1");
        let results = client
            .send_batch(&["t1".to_string()], &message())
            .await
            .unwrap();
        match &results[0] {
            DeliveryResult::Failed(f) => assert_eq!(f.kind, FailureKind::Transient),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
