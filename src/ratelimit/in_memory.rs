use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::ratelimit::{RateLimitDecision, RateLimitPolicy, WindowStore};

/// Sliding-window store keyed by client.
///
/// Each key's timestamps live behind its DashMap shard lock, so the
/// prune/decide/append sequence for one key is atomic while keys in other
/// shards proceed in parallel. Keys are only pruned when queried again;
/// call [`WindowStore::sweep`] to reclaim keys that went idle.
pub struct InMemoryWindowStore {
    policy: RateLimitPolicy,
    state: DashMap<String, SlidingWindowState>,
}

#[derive(Debug, Default)]
struct SlidingWindowState {
    entries: VecDeque<Instant>,
}

impl SlidingWindowState {
    /// Drops the chronological prefix strictly older than `now - window`.
    fn prune(&mut self, now: Instant, window: Duration) {
        // Process younger than the window: nothing can be stale yet.
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while let Some(front) = self.entries.front() {
            if *front < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn admit(&mut self, now: Instant, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.prune(now, policy.window);

        if self.entries.len() >= policy.limit as usize {
            let retry_after = self
                .entries
                .front()
                .map(|oldest| {
                    policy
                        .window
                        .saturating_sub(now.saturating_duration_since(*oldest))
                })
                .unwrap_or(policy.window);
            return RateLimitDecision::deny(retry_after);
        }

        self.entries.push_back(now);
        RateLimitDecision::admit()
    }
}

impl InMemoryWindowStore {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: DashMap::new(),
        }
    }

    #[cfg(test)]
    fn entries(&self, key: &str) -> usize {
        self.state.get(key).map(|w| w.entries.len()).unwrap_or(0)
    }
}

impl WindowStore for InMemoryWindowStore {
    fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    fn allow(&self, key: &str, now: Instant) -> RateLimitDecision {
        if let Some(mut window) = self.state.get_mut(key) {
            return window.admit(now, &self.policy);
        }

        self.state
            .entry(key.to_string())
            .or_default()
            .admit(now, &self.policy)
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.state.len();
        self.state.retain(|_, window| {
            window.prune(now, self.policy.window);
            !window.entries.is_empty()
        });
        before.saturating_sub(self.state.len())
    }

    fn tracked_keys(&self) -> usize {
        self.state.len()
    }
}
