//! Failure taxonomy for backend calls.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response arrived (connect failure, timeout, broken transport).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("request failed with status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Request { status: u16, message: Option<String> },

    /// Success status, but the body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A multipart upload part could not be built.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

impl ApiError {
    /// Server-supplied failure message, if the server sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Request { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// HTTP status for server-side failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::HttpClientBuild(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Build a [`ApiError::Request`] from a failed response body.
///
/// The backend reports failures as `{"detail": "..."}`. Validation failures
/// carry a list in `detail`, which is not a user-facing message.
pub(crate) fn request_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .and_then(|detail| match detail {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        });
    ApiError::Request { status, message }
}
