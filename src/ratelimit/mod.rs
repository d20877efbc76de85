pub mod in_memory;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;

use crate::clock::Clock;

/// Admission parameters shared read-only by every client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Window length in whole seconds, as reported to denied callers.
    pub fn window_seconds(&self) -> u64 {
        self.window.as_secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after: Duration,
}

impl RateLimitDecision {
    pub fn admit() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    pub fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }

    /// `Retry-After` value in integer seconds, rounded up so a client that
    /// waits exactly this long is admitted.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Per-key admission state.
///
/// `allow` must be atomic per key: two concurrent callers on the same key can
/// never both take the last free slot. Distinct keys must not serialize
/// behind one another.
pub trait WindowStore: Send + Sync {
    fn policy(&self) -> RateLimitPolicy;

    fn allow(&self, key: &str, now: Instant) -> RateLimitDecision;

    /// Drops keys with no entry inside the window. Returns how many were removed.
    fn sweep(&self, now: Instant) -> usize;

    fn tracked_keys(&self) -> usize;
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.store.allow(key, self.clock.now())
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.store.policy()
    }

    pub fn sweep(&self) -> usize {
        self.store.sweep(self.clock.now())
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }
}

pub fn spawn_sweeper(limiter: RateLimiter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            tracing::debug!(
                removed,
                tracked_keys = limiter.tracked_keys(),
                "swept idle rate limit keys"
            );
        }
    })
}
