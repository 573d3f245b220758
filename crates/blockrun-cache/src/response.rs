//! Exact-match response cache for non-streaming completions
//!
//! Keyed by a 32-hex-char SHA-256 prefix over the normalized request
//! body: non-semantic fields (`stream`, `user`, `request_id`,
//! `x-request-id`) and message timestamps are stripped before hashing so
//! retries and per-client noise still hit. Bounded by entry count and
//! item size; eviction drops expired entries first, then the
//! earliest-expiring.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use blockrun_config::ResponseCacheConfig;
use http::HeaderMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::dedup::StoredResponse;

/// Request fields that never affect the completion content
const NON_SEMANTIC_FIELDS: [&str; 4] = ["stream", "user", "request_id", "x-request-id"];

/// Cache key for a request body
///
/// Strips non-semantic top-level fields, canonicalizes, hashes. Non-JSON
/// bodies hash as raw bytes.
pub fn cache_key(body: &[u8]) -> String {
    let normalized = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut map)) => {
            for field in NON_SEMANTIC_FIELDS {
                map.remove(field);
            }
            let canonical = blockrun_core::canon::canonicalize(&Value::Object(map));
            serde_json::to_vec(&canonical).unwrap_or_else(|_| body.to_vec())
        }
        Ok(other) => serde_json::to_vec(&blockrun_core::canon::canonicalize(&other)).unwrap_or_else(|_| body.to_vec()),
        Err(_) => body.to_vec(),
    };

    let hash = Sha256::digest(&normalized);
    let hex = format!("{hash:x}");
    hex[..32].to_owned()
}

/// Whether a request may be served from / stored into the cache
///
/// `cache-control: no-cache`, or a top-level `cache: false` /
/// `no_cache: true` in the body, opt the request out.
pub fn should_cache(body: &Value, headers: &HeaderMap) -> bool {
    if let Some(cache_control) = headers.get(http::header::CACHE_CONTROL)
        && cache_control.to_str().is_ok_and(|v| v.to_lowercase().contains("no-cache"))
    {
        return false;
    }

    if body.get("cache").and_then(Value::as_bool) == Some(false) {
        return false;
    }
    if body.get("no_cache").and_then(Value::as_bool) == Some(true) {
        return false;
    }

    true
}

/// Hit/miss counters and current occupancy
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}

struct Entry {
    response: StoredResponse,
    model: String,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Min-expiration order; stale items are skipped lazily on pop
    expiry: BinaryHeap<Reverse<(Instant, String)>>,
}

/// Bounded LRU-with-TTL cache of completed responses
pub struct ResponseCache {
    config: ResponseCacheConfig,
    state: Mutex<State>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: ResponseCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Cached response for a key, counting the hit or miss
    pub fn get(&self, key: &str) -> Option<(StoredResponse, String)> {
        if !self.config.enabled {
            return None;
        }

        let mut state = self.lock();
        let hit = match state.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Some((entry.response.clone(), entry.model.clone()))
            }
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        };
        drop(state);

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Store a response; refuses errors, oversized bodies, and disabled caches
    pub fn set(&self, key: &str, response: StoredResponse, model: &str, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        if response.status.as_u16() >= 400 {
            return;
        }
        if response.body.len() > self.config.max_item_bytes {
            tracing::debug!(key, size = response.body.len(), "response too large to cache");
            return;
        }

        let now = Instant::now();
        let expires_at = now + ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_seconds));

        let mut state = self.lock();
        state.entries.insert(
            key.to_owned(),
            Entry {
                response,
                model: model.to_owned(),
                expires_at,
            },
        );
        state.expiry.push(Reverse((expires_at, key.to_owned())));
        Self::evict(&mut state, self.config.max_size);
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.expiry.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            enabled: self.config.enabled,
            size: state.entries.len(),
            max_size: self.config.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Expired entries first, then earliest-expiring until under capacity
    fn evict(state: &mut State, max_size: usize) {
        let now = Instant::now();

        while let Some(Reverse((expires_at, key))) = state.expiry.peek().cloned() {
            let stale_heap_item = state.entries.get(&key).is_none_or(|e| e.expires_at != expires_at);
            if stale_heap_item {
                state.expiry.pop();
                continue;
            }
            if expires_at <= now {
                state.expiry.pop();
                state.entries.remove(&key);
                continue;
            }
            break;
        }

        while state.entries.len() > max_size {
            match state.expiry.pop() {
                Some(Reverse((expires_at, key))) => {
                    if state.entries.get(&key).is_some_and(|e| e.expires_at == expires_at) {
                        state.entries.remove(&key);
                    }
                }
                None => break,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
