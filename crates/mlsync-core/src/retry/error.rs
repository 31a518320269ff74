//! Terminal error of a logical API operation.

use std::fmt;

use thiserror::Error;

/// Flattened error taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Token rejected and the single refresh-and-retry did not recover it.
    AuthExpired,
    /// Anti-automation block persisted through fallback and fast retries.
    Forbidden,
    RateLimited,
    ServerError,
    NetworkError,
    /// Non-retryable 4xx or an unparsable payload.
    Malformed,
    /// Stopped through the operation's cancel token.
    Cancelled,
}

impl ErrorKind {
    /// Transient failures: upstream should let the next scheduled cycle retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::ServerError | ErrorKind::NetworkError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure: kind, last HTTP status observed (if any) and a
/// redacted detail string. `detail` must never carry a raw secret.
#[derive(Debug, Clone, Error)]
#[error("{kind}{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub detail: String,
    /// Physical attempts issued by the logical operation.
    pub attempts: u32,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            detail: detail.into(),
            attempts: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, None, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status() {
        let e = ApiError::new(ErrorKind::RateLimited, Some(429), "attempt budget exhausted");
        assert_eq!(e.to_string(), "rate_limited (HTTP 429): attempt budget exhausted");
        let e = ApiError::new(ErrorKind::NetworkError, None, "connection refused");
        assert_eq!(e.to_string(), "network_error: connection refused");
    }

    #[test]
    fn transient_kinds() {
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(ErrorKind::NetworkError.is_transient());
        assert!(!ErrorKind::Forbidden.is_transient());
        assert!(!ErrorKind::Malformed.is_transient());
    }
}
