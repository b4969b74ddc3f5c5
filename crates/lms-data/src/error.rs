//! Fetch error types and their classification.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by a transport call (a read fetch or a remote mutation).
///
/// `Clone` so a single failure can be delivered to every caller that joined
/// the same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The call exceeded its time budget.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network-level failure (DNS, refused connection, reset).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The response body could not be parsed.
    #[error("Failed to parse response: {0}")]
    Deserialization(String),

    /// The request could not be built or sent.
    #[error("Request failed: {0}")]
    Request(String),
}

/// Classification of a failure, used to decide recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network failure, timeout, 5xx, 408 or 429. May be recovered by stale data.
    Transient,
    /// 404 or 410.
    NotFound,
    /// 401 or 403. Never retried, never masked.
    Permission,
    /// 409.
    Conflict,
    /// 400 or 422.
    Invalid,
    /// Any other 4xx.
    Rejected,
    /// Unparseable response or unbuildable request.
    Malformed,
}

impl FetchError {
    /// Create an HTTP error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a 404 error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message)
    }

    /// Create a 403 error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::http(403, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// HTTP status code, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout(_) | Self::Connection(_) => ErrorClass::Transient,
            Self::Deserialization(_) | Self::Request(_) => ErrorClass::Malformed,
            Self::Http { status, .. } => match *status {
                401 | 403 => ErrorClass::Permission,
                404 | 410 => ErrorClass::NotFound,
                409 => ErrorClass::Conflict,
                400 | 422 => ErrorClass::Invalid,
                408 | 429 => ErrorClass::Transient,
                500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Rejected,
            },
        }
    }

    /// Check if this failure may be recovered by serving stale data.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Check if the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    /// Check if the caller lacks permission.
    pub fn is_permission(&self) -> bool {
        self.class() == ErrorClass::Permission
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Deserialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(FetchError::http(503, "down").class(), ErrorClass::Transient);
        assert_eq!(FetchError::http(429, "slow down").class(), ErrorClass::Transient);
        assert_eq!(FetchError::Timeout(Duration::from_secs(1)).class(), ErrorClass::Transient);
        assert_eq!(FetchError::connection("reset").class(), ErrorClass::Transient);
        assert_eq!(FetchError::not_found("course").class(), ErrorClass::NotFound);
        assert_eq!(FetchError::http(401, "login").class(), ErrorClass::Permission);
        assert_eq!(FetchError::forbidden("admin only").class(), ErrorClass::Permission);
        assert_eq!(FetchError::http(409, "exists").class(), ErrorClass::Conflict);
        assert_eq!(FetchError::http(422, "bad").class(), ErrorClass::Invalid);
        assert_eq!(FetchError::http(418, "teapot").class(), ErrorClass::Rejected);
        assert_eq!(FetchError::Deserialization("eof".into()).class(), ErrorClass::Malformed);
    }

    #[test]
    fn test_json_error_conversion() {
        let err: FetchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, FetchError::Deserialization(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FetchError::http(500, "boom").to_string(), "HTTP 500: boom");
    }
}
