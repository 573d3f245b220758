//! Rate-limit cool-down tracking
//!
//! A model that returned 429 is de-prioritized (moved to the tail of the
//! fallback order) for a fixed window rather than skipped outright.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracks which models are currently in a rate-limit cool-down
#[derive(Debug)]
pub struct CooldownTracker {
    /// Model id -> when the rate limit was first observed
    limited: DashMap<String, Instant>,
    window: Duration,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            limited: DashMap::new(),
            window,
        }
    }

    /// Record a 429 for a model
    pub fn mark(&self, model: &str) {
        tracing::info!(model, window_secs = self.window.as_secs(), "model rate-limited, cooling down");
        self.limited.insert(model.to_owned(), Instant::now());
    }

    /// Whether a model is currently cooling down; expired entries are pruned
    pub fn is_limited(&self, model: &str) -> bool {
        match self.limited.get(model) {
            Some(entry) if entry.elapsed() < self.window => true,
            Some(_) => {
                drop(self.limited.remove(model));
                false
            }
            None => false,
        }
    }

    /// Re-order a candidate chain so cooling-down models come last
    ///
    /// Relative order is preserved within both partitions.
    pub fn reorder(&self, chain: Vec<String>) -> Vec<String> {
        let (healthy, limited): (Vec<String>, Vec<String>) =
            chain.into_iter().partition(|model| !self.is_limited(model));

        let mut ordered = healthy;
        ordered.extend(limited);
        ordered
    }
}
