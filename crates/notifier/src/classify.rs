//! Mapping of push-service error codes onto [`FailureKind`].
//!
//! Accepts FCM v1 `errorCode`/`status` names, the Admin SDK's `messaging/*` codes and the
//! legacy HTTP API's result strings, so results recorded from any of them classify the
//! same way.

use chatpush_common::types::FailureKind;

/// Codes meaning the registration token will never work again.
const PERMANENTLY_INVALID_CODES: &[&str] = &[
    "UNREGISTERED",
    "messaging/registration-token-not-registered",
    "messaging/invalid-registration-token",
    "NotRegistered",
    "InvalidRegistration",
];

/// Codes the push service documents as retryable.
const TRANSIENT_CODES: &[&str] = &[
    "UNAVAILABLE",
    "INTERNAL",
    "QUOTA_EXCEEDED",
    "messaging/server-unavailable",
    "messaging/internal-error",
    "messaging/message-rate-exceeded",
    "messaging/device-message-rate-exceeded",
    "Unavailable",
    "InternalServerError",
    "DeviceMessageRateExceeded",
];

/// Classify a push-service error code.
///
/// `message` is consulted only for `INVALID_ARGUMENT`, which FCM v1 also returns for
/// malformed payloads; it is a token problem only when the message names the token.
pub fn classify_code(code: &str, message: &str) -> FailureKind {
    if PERMANENTLY_INVALID_CODES.contains(&code) {
        return FailureKind::PermanentlyInvalid;
    }
    if TRANSIENT_CODES.contains(&code) {
        return FailureKind::Transient;
    }
    if (code == "INVALID_ARGUMENT" || code == "messaging/invalid-argument")
        && message.to_ascii_lowercase().contains("registration token")
    {
        return FailureKind::PermanentlyInvalid;
    }
    FailureKind::Unknown
}

/// Classify an HTTP status when the response body carried no usable error code.
///
/// A status alone never marks a token invalid; a bare 404 may come from a wrong endpoint.
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        429 | 500..=599 => FailureKind::Transient,
        _ => FailureKind::Unknown,
    }
}
