//! Classify HTTP responses and transport errors for retry decisions.

use std::time::Duration;

use crate::retry::error::ErrorKind;
use crate::transport::{HttpResponse, TransportError};

/// Outcome of one physical attempt, derived from the status code (and the
/// `Retry-After` header for 429). The body is only consulted for the
/// invalid/expired-token signal on 401/403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Bearer token rejected as invalid or expired.
    AuthExpired,
    /// 403 without a token signal; assumed anti-automation block.
    Forbidden,
    RateLimited { retry_after: Option<Duration> },
    ServerError(u16),
    /// Connection, DNS or timeout failure; no status.
    NetworkError,
    /// Any other non-2xx status. Never retried.
    ClientError(u16),
}

impl Classification {
    /// Flattened error kind for the caller; `None` for success.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Classification::Success => None,
            Classification::AuthExpired => Some(ErrorKind::AuthExpired),
            Classification::Forbidden => Some(ErrorKind::Forbidden),
            Classification::RateLimited { .. } => Some(ErrorKind::RateLimited),
            Classification::ServerError(_) => Some(ErrorKind::ServerError),
            Classification::NetworkError => Some(ErrorKind::NetworkError),
            Classification::ClientError(_) => Some(ErrorKind::Malformed),
        }
    }
}

/// Error codes in a 401/403 body that mean "your bearer token is no good".
const TOKEN_SIGNALS: &[&str] = &[
    "invalid_token",
    "invalid access token",
    "invalid_access_token",
    "expired_token",
    "token_expired",
    "expired access token",
    "access token expired",
];

/// Body fields inspected for a token signal.
const SIGNAL_FIELDS: &[&str] = &["error", "code", "message", "error_description"];

/// True if a JSON error body carries an explicit invalid/expired-token code.
pub fn body_signals_invalid_token(body: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    SIGNAL_FIELDS.iter().any(|field| {
        value
            .get(*field)
            .and_then(|v| v.as_str())
            .map(|s| {
                let s = s.to_ascii_lowercase();
                TOKEN_SIGNALS.iter().any(|sig| s.contains(sig))
            })
            .unwrap_or(false)
    })
}

/// Parse `Retry-After` in delta-seconds form. HTTP-dates are not honoured
/// and fall back to the exponential schedule.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Classify a received response.
pub fn classify_response(resp: &HttpResponse) -> Classification {
    match resp.status {
        200..=299 => Classification::Success,
        401 | 403 if body_signals_invalid_token(&resp.body) => Classification::AuthExpired,
        403 => Classification::Forbidden,
        429 => Classification::RateLimited {
            retry_after: resp.header("retry-after").and_then(parse_retry_after),
        },
        500..=599 => Classification::ServerError(resp.status),
        other => Classification::ClientError(other),
    }
}

/// Classify a transport failure. Malformed requests are our own bug and not retried.
pub fn classify_transport_error(e: &TransportError) -> Classification {
    match e {
        TransportError::Timeout(_) | TransportError::Connection(_) => Classification::NetworkError,
        TransportError::InvalidRequest(_) => Classification::ClientError(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    #[test]
    fn success_statuses() {
        assert_eq!(classify_response(&resp(200, "{}")), Classification::Success);
        assert_eq!(classify_response(&resp(204, "")), Classification::Success);
    }

    #[test]
    fn http_401_with_token_signal_is_auth_expired() {
        let body = r#"{"message":"invalid access token","error":"not_found","status":401,"cause":[]}"#;
        assert_eq!(classify_response(&resp(401, body)), Classification::AuthExpired);
        let body = r#"{"error":"invalid_token","message":"expired"}"#;
        assert_eq!(classify_response(&resp(401, body)), Classification::AuthExpired);
    }

    #[test]
    fn http_401_without_signal_is_terminal() {
        assert_eq!(
            classify_response(&resp(401, r#"{"message":"unauthorized"}"#)),
            Classification::ClientError(401)
        );
        assert_eq!(
            classify_response(&resp(401, "invalid_token but not json")),
            Classification::ClientError(401)
        );
    }

    #[test]
    fn http_403_is_forbidden_unless_token_signal() {
        let waf = r#"{"message":"forbidden","error":"forbidden","status":403,"blocked_by":"PolicyAgent"}"#;
        assert_eq!(classify_response(&resp(403, waf)), Classification::Forbidden);
        assert_eq!(classify_response(&resp(403, "<html>")), Classification::Forbidden);
        let expired = r#"{"error":"expired_token"}"#;
        assert_eq!(classify_response(&resp(403, expired)), Classification::AuthExpired);
    }

    #[test]
    fn http_429_reads_retry_after() {
        let r = resp(429, "").with_header("Retry-After", "2");
        assert_eq!(
            classify_response(&r),
            Classification::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        let r = resp(429, "").with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            classify_response(&r),
            Classification::RateLimited { retry_after: None }
        );
        assert_eq!(
            classify_response(&resp(429, "")),
            Classification::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn http_5xx_server_error() {
        assert_eq!(classify_response(&resp(500, "")), Classification::ServerError(500));
        assert_eq!(classify_response(&resp(503, "")), Classification::ServerError(503));
    }

    #[test]
    fn http_other_4xx_is_client_error() {
        assert_eq!(classify_response(&resp(404, "")), Classification::ClientError(404));
        assert_eq!(classify_response(&resp(400, "")), Classification::ClientError(400));
        assert_eq!(
            Classification::ClientError(404).kind(),
            Some(ErrorKind::Malformed)
        );
    }

    #[test]
    fn transport_errors() {
        assert_eq!(
            classify_transport_error(&TransportError::Timeout("t".into())),
            Classification::NetworkError
        );
        assert_eq!(
            classify_transport_error(&TransportError::Connection("c".into())),
            Classification::NetworkError
        );
        assert!(matches!(
            classify_transport_error(&TransportError::InvalidRequest("u".into())),
            Classification::ClientError(_)
        ));
    }
}
