//! Shared access-token state with mutually exclusive refresh.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::auth::refresh::{RefreshError, TokenGrant, TokenRefresher};
use crate::config::Credentials;
use crate::secret::Masked;

/// Lifecycle: `Unset → Valid → Expired → Refreshing → Valid | RefreshFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Valid,
    Expired,
    Refreshing,
    RefreshFailed,
}

/// Token handed to one request, tagged with the generation it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Bearer {
    pub token: String,
    pub generation: u64,
    /// The expiry estimate has passed; refresh before sending.
    pub expired: bool,
}

impl std::fmt::Debug for Bearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bearer")
            .field("token", &Masked(&self.token).to_string())
            .field("generation", &self.generation)
            .field("expired", &self.expired)
            .finish()
    }
}

struct TokenSlot {
    state: TokenState,
    access: Option<String>,
    refresh: Option<String>,
    /// `None` = unknown; rely on the 401 signal.
    expires_at: Option<Instant>,
    /// Bumped every time a refresh completes (either way).
    generation: u64,
}

/// Process-wide token state, owned explicitly and shared by handle (`Arc`).
///
/// Two locks: `slot` guards the fields and is held only briefly; `refresh_gate`
/// serializes refreshes and is held across the refresh call, so a caller
/// that arrives while a refresh is in flight waits on it and then reuses
/// the outcome instead of issuing a duplicate request.
pub struct TokenStore {
    slot: Mutex<TokenSlot>,
    refresh_gate: Mutex<()>,
}

impl TokenStore {
    pub fn new(access: Option<String>, refresh: Option<String>) -> Self {
        let state = if access.is_some() {
            TokenState::Valid
        } else {
            TokenState::Unset
        };
        Self {
            slot: Mutex::new(TokenSlot {
                state,
                access,
                refresh,
                expires_at: None,
                generation: 0,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn from_credentials(creds: &Credentials) -> Self {
        Self::new(creds.access_token.clone(), creds.refresh_token.clone())
    }

    /// Empty store: requests go out anonymous.
    pub fn anonymous() -> Self {
        Self::new(None, None)
    }

    /// Set an expiry estimate for the current token.
    pub fn set_expires_in(&self, ttl: Duration) {
        self.lock_slot().expires_at = Some(Instant::now() + ttl);
    }

    fn lock_slot(&self) -> MutexGuard<'_, TokenSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> TokenState {
        self.lock_slot().state
    }

    pub fn has_refresh_token(&self) -> bool {
        self.lock_slot().refresh.is_some()
    }

    /// Current access token for attaching to a request, if any.
    /// Marks the state `Expired` when the expiry estimate has passed.
    pub fn bearer(&self) -> Option<Bearer> {
        let mut slot = self.lock_slot();
        let token = slot.access.clone()?;
        if matches!(slot.state, TokenState::RefreshFailed) {
            return None;
        }
        let expired = match slot.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        } || slot.state == TokenState::Expired;
        if expired && slot.state == TokenState::Valid {
            slot.state = TokenState::Expired;
            tracing::debug!(token = %Masked(&token), "access token past expiry estimate");
        }
        Some(Bearer {
            token,
            generation: slot.generation,
            expired,
        })
    }

    /// Refresh the access token, unless someone else already did so after
    /// `observed_generation` was read. At most one refresh runs at a time.
    pub fn refresh(
        &self,
        observed_generation: u64,
        refresher: &dyn TokenRefresher,
    ) -> Result<Bearer, RefreshError> {
        let _gate = self.refresh_gate.lock().unwrap_or_else(|e| e.into_inner());

        let refresh_token = {
            let mut slot = self.lock_slot();
            if slot.generation != observed_generation {
                // A refresh completed while we were waiting: reuse its outcome.
                return match (slot.state, slot.access.clone()) {
                    (TokenState::Valid, Some(token)) => {
                        tracing::debug!(
                            generation = slot.generation,
                            "reusing token refreshed by another caller"
                        );
                        Ok(Bearer {
                            token,
                            generation: slot.generation,
                            expired: false,
                        })
                    }
                    _ => Err(RefreshError::PreviousRefreshFailed),
                };
            }
            let Some(refresh_token) = slot.refresh.clone() else {
                slot.state = TokenState::RefreshFailed;
                slot.generation += 1;
                tracing::error!("token refresh impossible: no refresh token configured");
                return Err(RefreshError::MissingCredentials("refresh_token"));
            };
            slot.state = TokenState::Refreshing;
            refresh_token
        };

        tracing::info!(refresh_token = %Masked(&refresh_token), "refreshing access token");
        let outcome = refresher.refresh(&refresh_token);

        let mut slot = self.lock_slot();
        slot.generation += 1;
        match outcome {
            Ok(grant) => {
                let TokenGrant {
                    access_token,
                    refresh_token: rotated,
                    expires_in,
                } = grant;
                tracing::info!(
                    token = %Masked(&access_token),
                    rotated = rotated.is_some(),
                    generation = slot.generation,
                    "access token refreshed"
                );
                slot.access = Some(access_token.clone());
                if let Some(rotated) = rotated {
                    slot.refresh = Some(rotated);
                }
                slot.expires_at = expires_in.map(|ttl| Instant::now() + ttl);
                slot.state = TokenState::Valid;
                Ok(Bearer {
                    token: access_token,
                    generation: slot.generation,
                    expired: false,
                })
            }
            Err(e) => {
                slot.state = TokenState::RefreshFailed;
                let held = [slot.access.as_deref(), Some(refresh_token.as_str())];
                let error = crate::secret::redact(&e.to_string(), held.into_iter().flatten());
                tracing::error!(%error, "access token refresh failed");
                Err(e)
            }
        }
    }

    /// Every secret currently held, for redaction of error details.
    pub fn secrets(&self) -> Vec<String> {
        let slot = self.lock_slot();
        slot.access
            .iter()
            .chain(slot.refresh.iter())
            .cloned()
            .collect()
    }
}
