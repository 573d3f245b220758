//! Request deduplication
//!
//! Identical concurrent requests collapse into one upstream call: the
//! first request becomes the originator, later arrivals wait on a
//! channel for its result. Recently completed responses are replayed for
//! a short window. Keys are a 16-hex-char prefix of SHA-256 over the
//! canonicalized body, so key order and timestamp prefixes don't split
//! identical requests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use http::{HeaderMap, StatusCode};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

/// Dedup key for a request body
pub fn dedup_key(body: &[u8]) -> String {
    let canonical = blockrun_core::canon::canonical_bytes(body);
    let hash = Sha256::digest(&canonical);
    let hex = format!("{hash:x}");
    hex[..16].to_owned()
}

/// Buffered response shared between the originator and its waiters
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// The 503 waiters receive when the originator fails
    pub fn origin_failed() -> Self {
        let body = serde_json::json!({
            "error": {
                "message": "Original request failed, please retry",
                "type": "dedup_origin_failed",
            }
        });
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: serde_json::to_vec(&body).expect("static body serializes"),
        }
    }
}

/// Outcome of claiming a dedup key
pub enum ClaimOutcome {
    /// A fresh completed response exists; replay it
    Cached(StoredResponse),
    /// Another task owns the key; await its result
    Wait(oneshot::Receiver<StoredResponse>),
    /// The caller is now the originator for this key
    Originator,
}

struct CompletedEntry {
    response: StoredResponse,
    completed_at: Instant,
}

#[derive(Default)]
struct State {
    inflight: HashMap<String, Vec<oneshot::Sender<StoredResponse>>>,
    completed: HashMap<String, CompletedEntry>,
}

/// Coalesces identical requests and briefly replays completed results
pub struct RequestDeduplicator {
    state: Mutex<State>,
    completed_ttl: Duration,
    max_body_bytes: usize,
}

impl RequestDeduplicator {
    pub fn new(completed_ttl: Duration, max_body_bytes: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            completed_ttl,
            max_body_bytes,
        }
    }

    /// Atomically resolve a key: cached replay, waiter, or originator
    ///
    /// A single lock acquisition decides the outcome, so two identical
    /// requests can never both become originator.
    pub fn claim(&self, key: &str) -> ClaimOutcome {
        let mut state = self.lock();
        Self::prune_expired(&mut state, self.completed_ttl);

        if let Some(entry) = state.completed.get(key) {
            return ClaimOutcome::Cached(entry.response.clone());
        }

        if let Some(waiters) = state.inflight.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            return ClaimOutcome::Wait(rx);
        }

        state.inflight.insert(key.to_owned(), Vec::new());
        ClaimOutcome::Originator
    }

    /// Fresh completed response for a key, if any
    pub fn get_cached(&self, key: &str) -> Option<StoredResponse> {
        let mut state = self.lock();
        Self::prune_expired(&mut state, self.completed_ttl);
        state.completed.get(key).map(|entry| entry.response.clone())
    }

    /// A future resolving with the originator's result, if the key is in flight
    pub fn get_inflight(&self, key: &str) -> Option<oneshot::Receiver<StoredResponse>> {
        let mut state = self.lock();
        let waiters = state.inflight.get_mut(key)?;
        let (tx, rx) = oneshot::channel();
        waiters.push(tx);
        Some(rx)
    }

    /// Register a key as in flight
    pub fn mark_inflight(&self, key: &str) {
        let mut state = self.lock();
        state.inflight.entry(key.to_owned()).or_default();
    }

    /// Publish the originator's result: wake waiters, cache briefly
    pub fn complete(&self, key: &str, response: StoredResponse) {
        let waiters = {
            let mut state = self.lock();

            if response.body.len() <= self.max_body_bytes {
                state.completed.insert(
                    key.to_owned(),
                    CompletedEntry {
                        response: response.clone(),
                        completed_at: Instant::now(),
                    },
                );
            }

            let waiters = state.inflight.remove(key).unwrap_or_default();
            Self::prune_expired(&mut state, self.completed_ttl);
            waiters
        };

        // Waiters are woken outside the lock
        for waiter in waiters {
            let _ = waiter.send(response.clone());
        }
    }

    /// Drop an in-flight registration after an originator failure
    ///
    /// Waiters resolve with a 503 so nobody hangs on a dead originator.
    pub fn remove_inflight(&self, key: &str) {
        let waiters = {
            let mut state = self.lock();
            state.inflight.remove(key).unwrap_or_default()
        };

        if !waiters.is_empty() {
            tracing::debug!(key, waiters = waiters.len(), "originator failed, releasing waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(StoredResponse::origin_failed());
        }
    }

    /// Drop expired completed entries (also runs on every access)
    pub fn prune(&self) {
        let mut state = self.lock();
        Self::prune_expired(&mut state, self.completed_ttl);
    }

    fn prune_expired(state: &mut State, ttl: Duration) {
        state.completed.retain(|_, entry| entry.completed_at.elapsed() < ttl);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> StoredResponse {
        StoredResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn dedup() -> RequestDeduplicator {
        RequestDeduplicator::new(Duration::from_secs(30), 1024 * 1024)
    }

    #[test]
    fn key_ignores_field_order_and_timestamps() {
        let a = br#"{"model":"auto","messages":[{"role":"user","content":"[Mon 2025-06-02 14:31 UTC] hi"}]}"#;
        let b = br#"{"messages":[{"content":"hi","role":"user"}],"model":"auto"}"#;
        assert_eq!(dedup_key(a), dedup_key(b));
        assert_eq!(dedup_key(a).len(), 16);
    }

    #[test]
    fn key_canonicalization_is_idempotent() {
        let body = br#"{"b":1,"a":{"content":"[Mon 2025-06-02 14:31 UTC] x"}}"#;
        let canonical = blockrun_core::canon::canonical_bytes(body);
        assert_eq!(dedup_key(body), dedup_key(&canonical));
    }

    #[test]
    fn first_claim_is_originator_second_waits() {
        let d = dedup();
        assert!(matches!(d.claim("k"), ClaimOutcome::Originator));
        assert!(matches!(d.claim("k"), ClaimOutcome::Wait(_)));
    }

    #[tokio::test]
    async fn complete_wakes_waiters_and_caches() {
        let d = dedup();
        assert!(matches!(d.claim("k"), ClaimOutcome::Originator));
        let ClaimOutcome::Wait(rx) = d.claim("k") else {
            panic!("expected waiter");
        };

        d.complete("k", response("done"));

        let got = rx.await.unwrap();
        assert_eq!(got.body, b"done");

        // Replay window
        match d.claim("k") {
            ClaimOutcome::Cached(cached) => assert_eq!(cached.body, b"done"),
            _ => panic!("expected cached replay"),
        }
    }

    #[tokio::test]
    async fn remove_inflight_resolves_waiters_with_503() {
        let d = dedup();
        assert!(matches!(d.claim("k"), ClaimOutcome::Originator));
        let ClaimOutcome::Wait(rx) = d.claim("k") else {
            panic!("expected waiter");
        };

        d.remove_inflight("k");

        let got = rx.await.unwrap();
        assert_eq!(got.status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_slice(&got.body).unwrap();
        assert_eq!(json["error"]["type"], "dedup_origin_failed");

        // Key is free again
        assert!(matches!(d.claim("k"), ClaimOutcome::Originator));
    }

    #[test]
    fn oversized_bodies_are_not_cached() {
        let d = RequestDeduplicator::new(Duration::from_secs(30), 8);
        d.mark_inflight("k");
        d.complete("k", response("way more than eight bytes"));
        assert!(d.get_cached("k").is_none());
    }

    #[test]
    fn expired_entries_prune_on_access() {
        let d = RequestDeduplicator::new(Duration::from_millis(0), 1024);
        d.mark_inflight("k");
        d.complete("k", response("x"));
        assert!(d.get_cached("k").is_none());
    }
}
