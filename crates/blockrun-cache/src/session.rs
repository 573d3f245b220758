//! Session → model pinning
//!
//! A session id (from a configurable request header) pins the first
//! routing decision so a conversation stays on one model. Idle sessions
//! are evicted by a periodic background sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use blockrun_core::Tier;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// One pinned session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub model: String,
    pub tier: Tier,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub request_count: u64,
}

/// Session id → pinned model
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    /// Pinned model and tier for a session, if it is still live
    pub fn get(&self, session_id: &str) -> Option<(String, Tier)> {
        let entry = self.sessions.get(session_id)?;
        if entry.last_used_at.elapsed() > self.timeout {
            drop(entry);
            self.sessions.remove(session_id);
            return None;
        }
        Some((entry.model.clone(), entry.tier))
    }

    /// Create or update a session's pin
    pub fn set(&self, session_id: &str, model: &str, tier: Tier) {
        let now = Instant::now();
        self.sessions
            .entry(session_id.to_owned())
            .and_modify(|entry| {
                entry.model = model.to_owned();
                entry.tier = tier;
                entry.last_used_at = now;
                entry.request_count += 1;
            })
            .or_insert_with(|| SessionEntry {
                model: model.to_owned(),
                tier,
                created_at: now,
                last_used_at: now,
                request_count: 1,
            });
    }

    /// Advance a session's idle clock
    pub fn touch(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_used_at = Instant::now();
            entry.request_count += 1;
        }
    }

    /// Evict sessions idle longer than the timeout
    pub fn sweep(&self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.last_used_at.elapsed() <= self.timeout);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "swept idle sessions");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run the eviction sweep on an interval until cancelled
    pub fn spawn_sweeper(store: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let store = Arc::clone(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => store.sweep(),
                    () = shutdown.cancelled() => break,
                }
            }
        });
    }
}
