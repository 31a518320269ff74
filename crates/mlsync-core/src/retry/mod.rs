//! Retry and backoff policy.
//!
//! This module encapsulates response classification (auth expiry, anti-bot
//! blocks, throttling, server and network failures) and the backoff
//! decision table so that the request orchestrator can stay a small state
//! machine around them. Nothing here performs I/O.

mod classify;
mod error;
mod policy;

pub use classify::{
    body_signals_invalid_token, classify_response, classify_transport_error, parse_retry_after,
    Classification,
};
pub use error::{ApiError, ErrorKind};
pub use policy::{BackoffPolicy, RetryDecision};
