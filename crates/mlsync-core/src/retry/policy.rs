use std::time::Duration;

use crate::config::RetryConfig;
use crate::retry::classify::Classification;

/// Decision returned by the backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the current classification is final.
    Stop,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a hard attempt cap and a fast-fail lane for 403.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of charged attempts (including the first).
    pub max_attempts: u32,
    /// 403 is retried only while `attempt_index < forbidden_retries`.
    pub forbidden_retries: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    /// Fixed pause between 403 retries.
    pub forbidden_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            forbidden_retries: cfg.forbidden_retries,
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            forbidden_delay: Duration::from_secs_f64(cfg.forbidden_delay_secs.max(0.0)),
        }
    }

    /// `min(base_delay * 2^attempt_index, max_delay)`.
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide what to do after the attempt at `attempt_index` (0-based)
    /// produced `classification`.
    ///
    /// `AuthExpired` stops here; the orchestrator handles the one
    /// refresh-and-retry before consulting the policy.
    pub fn decide(&self, classification: &Classification, attempt_index: u32) -> RetryDecision {
        let exhausted = attempt_index.saturating_add(1) >= self.max_attempts;

        match classification {
            Classification::Success
            | Classification::AuthExpired
            | Classification::ClientError(_) => RetryDecision::Stop,
            Classification::Forbidden => {
                if exhausted || attempt_index >= self.forbidden_retries {
                    RetryDecision::Stop
                } else {
                    RetryDecision::RetryAfter(self.forbidden_delay)
                }
            }
            Classification::RateLimited { retry_after } => {
                if exhausted {
                    return RetryDecision::Stop;
                }
                RetryDecision::RetryAfter(
                    retry_after.unwrap_or_else(|| self.backoff_delay(attempt_index)),
                )
            }
            Classification::ServerError(_) | Classification::NetworkError => {
                if exhausted {
                    return RetryDecision::Stop;
                }
                RetryDecision::RetryAfter(self.backoff_delay(attempt_index))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 64,
            ..BackoffPolicy::default()
        }
    }

    fn delay(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::Stop => panic!("expected retry"),
        }
    }

    #[test]
    fn stop_for_success_and_auth_expired() {
        let p = BackoffPolicy::default();
        assert_eq!(p.decide(&Classification::Success, 0), RetryDecision::Stop);
        assert_eq!(p.decide(&Classification::AuthExpired, 0), RetryDecision::Stop);
        assert_eq!(p.decide(&Classification::ClientError(404), 0), RetryDecision::Stop);
    }

    #[test]
    fn server_error_delay_is_capped_exponential() {
        let p = wide();
        let mut last = Duration::ZERO;
        for k in 0..40 {
            let d = delay(p.decide(&Classification::ServerError(502), k));
            let expected = (p.base_delay.saturating_mul(2u32.saturating_pow(k))).min(p.max_delay);
            assert_eq!(d, expected, "attempt_index {}", k);
            assert!(d >= last);
            last = d;
        }
        assert_eq!(delay(p.decide(&Classification::ServerError(500), 0)), Duration::from_secs(1));
        assert_eq!(delay(p.decide(&Classification::ServerError(500), 3)), Duration::from_secs(8));
        assert_eq!(delay(p.decide(&Classification::NetworkError, 5)), Duration::from_secs(30));
    }

    #[test]
    fn forbidden_fast_fails() {
        let p = BackoffPolicy::default();
        assert_eq!(
            p.decide(&Classification::Forbidden, 0),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            p.decide(&Classification::Forbidden, 1),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        for k in 2..10 {
            assert_eq!(wide().decide(&Classification::Forbidden, k), RetryDecision::Stop);
        }
    }

    #[test]
    fn rate_limited_prefers_retry_after() {
        let p = BackoffPolicy::default();
        let hinted = Classification::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(p.decide(&hinted, 0), RetryDecision::RetryAfter(Duration::from_secs(2)));
        let bare = Classification::RateLimited { retry_after: None };
        assert_eq!(p.decide(&bare, 1), RetryDecision::RetryAfter(Duration::from_secs(2)));
        assert_eq!(p.decide(&bare, 0), RetryDecision::RetryAfter(Duration::from_secs(1)));
    }

    #[test]
    fn respects_max_attempts() {
        let p = BackoffPolicy::default();
        let c = Classification::RateLimited { retry_after: None };
        assert!(matches!(p.decide(&c, 0), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(&c, 1), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(&c, 2), RetryDecision::Stop);
        assert_eq!(p.decide(&Classification::NetworkError, 2), RetryDecision::Stop);
    }

    #[test]
    fn from_config_converts_units() {
        let cfg = RetryConfig {
            max_attempts: 0,
            forbidden_retries: 1,
            base_delay_secs: 0.25,
            max_delay_secs: 4,
            forbidden_delay_secs: 0.5,
        };
        let p = BackoffPolicy::from_config(&cfg);
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.base_delay, Duration::from_millis(250));
        assert_eq!(p.forbidden_delay, Duration::from_millis(500));
        assert_eq!(p.backoff_delay(10), Duration::from_secs(4));
    }
}
