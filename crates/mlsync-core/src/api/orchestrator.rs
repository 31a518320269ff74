//! Resilient request orchestrator.
//!
//! Runs one logical operation as a small state machine:
//!
//! ```text
//! Attempting ──► Terminal                     (2xx, or policy says Stop)
//!     │──────► RefreshingAuth ──► Attempting  (AuthExpired, once per call)
//!     │──────► FallingBackAnonymous ──► Attempting
//!     │                                       (403 with a token, once per call)
//!     └──────► Retrying(delay) ──► Attempting (policy says RetryAfter)
//! ```
//!
//! Guards are checked in that order: auth refresh, then anonymous fallback,
//! then the generic backoff policy. The refresh retry and the fallback do
//! not consume a slot of the attempt budget.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::api::headers;
use crate::api::operation::Operation;
use crate::auth::{OAuthRefresher, TokenRefresher, TokenStore};
use crate::config::{MlsyncConfig, Route};
use crate::control::{CancelToken, Sleeper, ThreadSleeper};
use crate::retry::{
    classify_response, classify_transport_error, ApiError, BackoffPolicy, Classification,
    ErrorKind, RetryDecision,
};
use crate::secret::redact;
use crate::transport::{CurlTransport, HttpRequest, HttpResponse, Transport};

/// Longest slice of a response body quoted in an error detail.
const DETAIL_SNIPPET_CHARS: usize = 160;

/// Whether and how a bearer token is used for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Attach the token when one is available; never drop it.
    Authenticated,
    /// Attach the token, but on a 403 retry once without it.
    AnonymousFallbackAllowed,
    /// Never attach a token.
    Anonymous,
}

/// Where requests go and how the caller authenticates to a proxy.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub site_id: String,
    pub route: Route,
    pub worker_key: Option<String>,
}

impl Endpoint {
    pub fn from_config(cfg: &MlsyncConfig) -> Self {
        Self {
            base_url: cfg.api.base_url.clone(),
            site_id: cfg.api.site_id.clone(),
            route: cfg.route(),
            worker_key: cfg.credentials.worker_key.clone(),
        }
    }
}

/// One physical send, recorded once its outcome is known.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// Ordinal of the physical send within the logical call, from 0.
    pub index: u32,
    pub with_token: bool,
    pub sent_at: SystemTime,
    pub outcome: Classification,
}

/// Successful outcome; status and body are exactly what the server sent.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub attempts: Vec<RequestAttempt>,
}

pub type OperationResult = Result<ApiResponse, ApiError>;

enum Step {
    Attempting,
    Retrying(Duration),
    RefreshingAuth,
    FallingBackAnonymous,
    Terminal(OperationResult),
}

/// Per-call bookkeeping; discarded when the call returns.
struct CallState {
    /// Index of the current charged attempt (backoff budget).
    attempt_index: u32,
    refreshed: bool,
    fell_back: bool,
    anonymous: bool,
    observed_generation: u64,
    history: Vec<RequestAttempt>,
    last_status: Option<u16>,
    last_detail: String,
}

impl CallState {
    fn new(mode: RequestMode) -> Self {
        Self {
            attempt_index: 0,
            refreshed: false,
            fell_back: false,
            anonymous: mode == RequestMode::Anonymous,
            observed_generation: 0,
            history: Vec::new(),
            last_status: None,
            last_detail: String::new(),
        }
    }

    fn physical_attempts(&self) -> u32 {
        self.history.len() as u32
    }
}

pub struct Orchestrator {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            tokens,
            refresher,
            policy: BackoffPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Production wiring: curl transport with the configured timeouts and
    /// the OAuth refresher against the same base URL.
    pub fn from_config(cfg: &MlsyncConfig, tokens: Arc<TokenStore>) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(CurlTransport::new(
            cfg.request_timeout(),
            cfg.connect_timeout(),
        ));
        let refresher = Arc::new(OAuthRefresher::from_config(Arc::clone(&transport), cfg));
        Self::new(Endpoint::from_config(cfg), transport, tokens, refresher)
            .with_policy(BackoffPolicy::from_config(&cfg.retry_or_default()))
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Run one logical operation to a terminal result.
    pub fn perform(&self, op: &Operation, mode: RequestMode, cancel: &CancelToken) -> OperationResult {
        let url = op.url(&self.endpoint.base_url, &self.endpoint.site_id)?;
        let mut call = CallState::new(mode);
        let mut step = Step::Attempting;

        loop {
            step = match step {
                Step::Attempting => self.attempt(op, url.as_str(), mode, &mut call, cancel),
                Step::RefreshingAuth => self.refresh_auth(op, &mut call, cancel),
                Step::FallingBackAnonymous => {
                    tracing::info!(
                        op = op.name(),
                        attempt = call.physical_attempts(),
                        "403 with token; retrying once without it"
                    );
                    call.fell_back = true;
                    call.anonymous = true;
                    Step::Attempting
                }
                Step::Retrying(delay) => {
                    if cancel.is_cancelled() || !self.sleeper.sleep(delay, cancel) {
                        Step::Terminal(Err(self.cancelled(op, &call)))
                    } else {
                        call.attempt_index += 1;
                        Step::Attempting
                    }
                }
                Step::Terminal(result) => return result,
            };
        }
    }

    fn attempt(
        &self,
        op: &Operation,
        url: &str,
        mode: RequestMode,
        call: &mut CallState,
        cancel: &CancelToken,
    ) -> Step {
        if cancel.is_cancelled() {
            return Step::Terminal(Err(self.cancelled(op, call)));
        }

        let bearer = if call.anonymous {
            None
        } else {
            self.tokens.bearer()
        };
        if let Some(b) = &bearer {
            call.observed_generation = b.generation;
            if b.expired && !call.refreshed && self.tokens.has_refresh_token() {
                tracing::debug!(op = op.name(), "token past expiry estimate; refreshing before send");
                return Step::RefreshingAuth;
            }
        }
        let with_token = bearer.is_some();

        let request = headers::decorate(
            HttpRequest::get(url),
            self.endpoint.route,
            self.endpoint.worker_key.as_deref(),
            bearer.as_ref().map(|b| b.token.as_str()),
        );

        let index = call.physical_attempts();
        let sent_at = SystemTime::now();
        let (classification, response) = match self.transport.send(&request) {
            Ok(resp) => (classify_response(&resp), Some(resp)),
            Err(e) => {
                call.last_detail = self.redacted(&e.to_string());
                (classify_transport_error(&e), None)
            }
        };
        call.history.push(RequestAttempt {
            index,
            with_token,
            sent_at,
            outcome: classification,
        });

        if let Some(resp) = &response {
            call.last_status = Some(resp.status);
            if !resp.is_success() {
                call.last_detail = self.redacted(&snippet(resp));
            }
        }

        tracing::debug!(
            op = op.name(),
            attempt = index,
            budget_index = call.attempt_index,
            with_token,
            status = call.last_status,
            classification = ?classification,
            "physical attempt finished"
        );

        if let (Classification::Success, Some(resp)) = (classification, response) {
            return Step::Terminal(Ok(ApiResponse {
                status: resp.status,
                body: resp.body,
                attempts: std::mem::take(&mut call.history),
            }));
        }

        self.next_step(op, classification, with_token, mode, call)
    }

    /// Ordered guards: auth refresh, anonymous fallback, backoff policy.
    fn next_step(
        &self,
        op: &Operation,
        classification: Classification,
        with_token: bool,
        mode: RequestMode,
        call: &CallState,
    ) -> Step {
        if classification == Classification::AuthExpired && with_token && !call.refreshed {
            return Step::RefreshingAuth;
        }
        if classification == Classification::Forbidden
            && with_token
            && mode == RequestMode::AnonymousFallbackAllowed
            && !call.fell_back
        {
            return Step::FallingBackAnonymous;
        }

        match self.policy.decide(&classification, call.attempt_index) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    op = op.name(),
                    attempt = call.attempt_index,
                    classification = ?classification,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                Step::Retrying(delay)
            }
            RetryDecision::Stop => {
                let kind = classification.kind().unwrap_or(ErrorKind::Malformed);
                Step::Terminal(Err(self.terminal(op, kind, call)))
            }
        }
    }

    fn refresh_auth(&self, op: &Operation, call: &mut CallState, cancel: &CancelToken) -> Step {
        if cancel.is_cancelled() {
            return Step::Terminal(Err(self.cancelled(op, call)));
        }
        call.refreshed = true;
        match self
            .tokens
            .refresh(call.observed_generation, self.refresher.as_ref())
        {
            Ok(bearer) => {
                call.observed_generation = bearer.generation;
                Step::Attempting
            }
            Err(e) => {
                call.last_detail = self.redacted(&format!("token refresh failed: {}", e));
                Step::Terminal(Err(self.terminal(op, ErrorKind::AuthExpired, call)))
            }
        }
    }

    fn terminal(&self, op: &Operation, kind: ErrorKind, call: &CallState) -> ApiError {
        let attempts = call.physical_attempts();
        let detail = if call.last_detail.is_empty() {
            format!("{} failed after {} attempt(s)", op.name(), attempts)
        } else {
            format!(
                "{} failed after {} attempt(s): {}",
                op.name(),
                attempts,
                call.last_detail
            )
        };
        tracing::warn!(op = op.name(), kind = %kind, status = call.last_status, attempts, "operation failed");
        ApiError::new(kind, call.last_status, detail).with_attempts(attempts)
    }

    fn cancelled(&self, op: &Operation, call: &CallState) -> ApiError {
        let attempts = call.physical_attempts();
        tracing::info!(op = op.name(), attempts, "operation cancelled");
        ApiError::new(
            ErrorKind::Cancelled,
            call.last_status,
            format!("{} cancelled after {} attempt(s)", op.name(), attempts),
        )
        .with_attempts(attempts)
    }

    fn redacted(&self, text: &str) -> String {
        let held = self.tokens.secrets();
        let mut secrets: Vec<&str> = held.iter().map(String::as_str).collect();
        if let Some(key) = self.endpoint.worker_key.as_deref() {
            secrets.push(key);
        }
        redact(text, secrets)
    }
}

fn snippet(resp: &HttpResponse) -> String {
    let text = resp.body_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return format!("HTTP {}", resp.status);
    }
    let cut: String = trimmed.chars().take(DETAIL_SNIPPET_CHARS).collect();
    format!("HTTP {}: {}", resp.status, cut)
}
