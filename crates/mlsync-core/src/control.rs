//! Cancellation for in-progress operations: shared abort tokens.
//!
//! A `CancelToken` is handed to every logical API operation. The
//! orchestrator checks it before each physical attempt and before each
//! backoff sleep, and sleeps wake early when it is set, so an external
//! deadline can abort a multi-attempt operation without waiting out the
//! remaining backoff budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellation checks while sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared abort flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every holder of a clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Cancel this token once `after` has elapsed (external deadline).
    /// The timer thread exits early if the token is cancelled by someone else.
    pub fn cancel_after(&self, after: Duration) {
        let token = self.clone();
        std::thread::spawn(move || {
            if !token.sleep(after) {
                return;
            }
            tracing::warn!(deadline_ms = after.as_millis() as u64, "deadline reached, cancelling");
            token.cancel();
        });
    }

    /// Sleep for `d`, waking early on cancellation.
    /// Returns false if the token was cancelled before the full duration elapsed.
    pub fn sleep(&self, d: Duration) -> bool {
        let deadline = Instant::now() + d;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Something that can wait out a backoff delay. Injectable so tests can
/// observe the delays without actually sleeping.
pub trait Sleeper: Send + Sync {
    /// Wait for `d` unless `cancel` fires first. Returns false if cancelled.
    fn sleep(&self, d: Duration, cancel: &CancelToken) -> bool;
}

/// Blocks the calling thread only (one worker thread per operation).
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration, cancel: &CancelToken) -> bool {
        cancel.sleep(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let t = CancelToken::new();
        assert!(t.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn sleep_wakes_early_on_cancel() {
        let t = CancelToken::new();
        let c = t.clone();
        let started = Instant::now();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            c.cancel();
        });
        assert!(!t.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_after_fires() {
        let t = CancelToken::new();
        t.cancel_after(Duration::from_millis(20));
        assert!(!t.sleep(Duration::from_secs(10)));
        assert!(t.is_cancelled());
    }
}
