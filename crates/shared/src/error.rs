//! Shared error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the portal API: `{"message": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub message: String,
}

/// Attempt to pull a user-facing message out of an error response body.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    let message = parsed.message.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    /// The server rejected the credential; the session is no longer valid.
    #[error("Unauthorized: {}", .0.as_deref().unwrap_or("no message"))]
    Unauthorized(Option<String>),
    /// `message` is only set when the body carried a `{"message"}` field.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Http {
        status: u16,
        message: Option<String>,
    },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Build an error from a non-success status and its response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = try_error_message(body);
        if status == 401 {
            ApiError::Unauthorized(message)
        } else {
            ApiError::Http { status, message }
        }
    }

    /// The message the server sent with this error, if there was one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(message) | ApiError::Http { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

/// Why an inbound live-update frame was discarded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no event type")]
    MissingType,
    #[error("payload of `{event_type}` has the wrong shape: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_becomes_unauthorized() {
        let err = ApiError::from_status(401, r#"{"message": "Token is invalid!"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.server_message(), Some("Token is invalid!"));
    }

    #[test]
    fn bodies_without_a_message_carry_none() {
        let err = ApiError::from_status(500, "<!doctype html><title>500 Internal Server Error</title>");
        assert_eq!(
            err,
            ApiError::Http {
                status: 500,
                message: None
            }
        );
        assert_eq!(err.server_message(), None);
        assert_eq!(err.to_string(), "HTTP 500: no message");

        let err = ApiError::from_status(401, "");
        assert!(err.is_unauthorized());
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn blank_messages_are_ignored() {
        assert_eq!(try_error_message(r#"{"message": "   "}"#), None);
        assert_eq!(try_error_message("<html>"), None);
        assert_eq!(
            try_error_message(r#"{"message": "Subject already exists!"}"#).as_deref(),
            Some("Subject already exists!")
        );
    }
}
