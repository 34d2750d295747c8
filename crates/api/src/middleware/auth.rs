//! Trigger authentication.
//!
//! When `TRIGGER_JWT_SECRET` is configured, the event source must sign each delivery with
//! an HS256 JWT sent as `Authorization: Bearer <token>`. Without a secret every request is
//! accepted, which suits hosts where the platform already authenticates the caller.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use chatpush_common::error::AppError;

use crate::state::AppState;

/// JWT claims carried by a signed trigger.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the event source identity
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// An accepted trigger request.
#[derive(Debug, Clone)]
pub struct TriggerAuth {
    /// Verified caller, `None` when trigger auth is disabled.
    pub source: Option<String>,
}

/// Sign a trigger token for `source`.
pub fn encode_jwt(source: &str, secret: &str, expiry_minutes: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: source.to_string(),
        exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a trigger token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

impl FromRequestParts<AppState> for TriggerAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.trigger_jwt_secret.as_deref() else {
            return Ok(TriggerAuth { source: None });
        };

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Auth("Missing Authorization header. Use 'Bearer <JWT>'".to_string())
            })?;

        let claims = decode_jwt(token, secret)?;
        Ok(TriggerAuth {
            source: Some(claims.sub),
        })
    }
}
