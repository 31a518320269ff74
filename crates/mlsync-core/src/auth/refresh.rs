//! OAuth refresh-token exchange.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::form_urlencoded;

use crate::config::{Credentials, MlsyncConfig};
use crate::secret::redact;
use crate::transport::{HttpRequest, Transport};

/// New credential material returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the backend rotates refresh tokens.
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
}

#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),
    #[error("token endpoint returned HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("token endpoint unreachable: {0}")]
    Transport(String),
    #[error("token endpoint response unparsable: {0}")]
    Malformed(String),
    #[error("a concurrent token refresh failed")]
    PreviousRefreshFailed,
}

impl RefreshError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RefreshError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Exchanges a refresh credential for a new access credential.
/// Implementations make exactly one call; refresh is never retried.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// `POST {base}/oauth/token` with `grant_type=refresh_token`.
pub struct OAuthRefresher {
    transport: Arc<dyn Transport>,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl OAuthRefresher {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, creds: &Credentials) -> Self {
        Self {
            transport,
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, cfg: &MlsyncConfig) -> Self {
        Self::new(transport, &cfg.api.base_url, &cfg.credentials)
    }

    fn form_body(&self, client_id: &str, client_secret: &str, refresh_token: &str) -> Vec<u8> {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret)
            .append_pair("refresh_token", refresh_token)
            .finish()
            .into_bytes()
    }
}

impl TokenRefresher for OAuthRefresher {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(RefreshError::MissingCredentials("client_id"))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(RefreshError::MissingCredentials("client_secret"))?;

        let secrets = [client_secret, refresh_token];
        let request = HttpRequest::post(
            self.token_url.as_str(),
            self.form_body(client_id, client_secret, refresh_token),
        )
        .header("Accept", "application/json")
        .header("Content-Type", "application/x-www-form-urlencoded");

        let resp = self
            .transport
            .send(&request)
            .map_err(|e| RefreshError::Transport(redact(&e.to_string(), secrets)))?;

        if !resp.is_success() {
            let detail: String = redact(&resp.body_text(), secrets).chars().take(200).collect();
            return Err(RefreshError::Rejected {
                status: resp.status,
                detail,
            });
        }

        let parsed: TokenResponse = serde_json::from_slice(&resp.body)
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        Ok(TokenGrant {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, Method, TransportError};
    use std::sync::Mutex;

    struct Canned {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for Canned {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn creds() -> Credentials {
        Credentials {
            client_id: Some("123456".to_string()),
            client_secret: Some("client-secret-abcdef".to_string()),
            ..Default::default()
        }
    }

    fn canned(status: u16, body: &str) -> Arc<Canned> {
        Arc::new(Canned {
            response: HttpResponse::new(status, body),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn posts_form_and_parses_grant() {
        let t = canned(
            200,
            r#"{"access_token":"APP_USR-fresh","token_type":"bearer","expires_in":21600,"refresh_token":"TG-rotated"}"#,
        );
        let r = OAuthRefresher::new(t.clone(), "https://api.example.com/", &creds());
        let grant = r.refresh("TG-original-refresh").unwrap();
        assert_eq!(grant.access_token, "APP_USR-fresh");
        assert_eq!(grant.refresh_token.as_deref(), Some("TG-rotated"));
        assert_eq!(grant.expires_in, Some(Duration::from_secs(21600)));

        let seen = t.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].url, "https://api.example.com/oauth/token");
        let body = String::from_utf8(seen[0].body.clone().unwrap()).unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=TG-original-refresh"));
        assert!(body.contains("client_id=123456"));
    }

    #[test]
    fn non_2xx_is_rejected_and_redacted() {
        let t = canned(
            400,
            r#"{"error":"invalid_grant","message":"TG-original-refresh is revoked"}"#,
        );
        let r = OAuthRefresher::new(t, "https://api.example.com", &creds());
        let err = r.refresh("TG-original-refresh").unwrap_err();
        assert_eq!(err.status(), Some(400));
        let text = err.to_string();
        assert!(!text.contains("TG-original-refresh"));
        assert!(text.contains("TG-ori...esh"));
    }

    #[test]
    fn missing_client_credentials_skip_network() {
        let t = canned(200, "{}");
        let r = OAuthRefresher::new(t.clone(), "https://api.example.com", &Credentials::default());
        assert!(matches!(
            r.refresh("TG-x"),
            Err(RefreshError::MissingCredentials("client_id"))
        ));
        assert!(t.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unparsable_grant_is_malformed() {
        let t = canned(200, "not json");
        let r = OAuthRefresher::new(t, "https://api.example.com", &creds());
        assert!(matches!(r.refresh("TG-x"), Err(RefreshError::Malformed(_))));
    }
}
