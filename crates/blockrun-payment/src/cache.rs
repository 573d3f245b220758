//! Per-endpoint cache of accepted payment parameters
//!
//! A successful 402 handshake records the server's accepted option under
//! the endpoint path. While the entry is fresh the fetch layer can sign a
//! pre-authorized payment on the first request and skip the 402 round
//! trip entirely.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::protocol::{PaymentOption, ResourceInfo};

/// Payment parameters derived from an accepted option
#[derive(Debug, Clone)]
pub struct PaymentParams {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub pay_to: String,
    pub max_timeout_seconds: Option<u64>,
    pub extra_name: Option<String>,
    pub extra_version: Option<String>,
    pub resource_url: Option<String>,
    pub resource_description: Option<String>,
}

impl PaymentParams {
    /// Derive cacheable parameters from a 402 response
    pub fn from_option(option: &PaymentOption, resource: Option<&ResourceInfo>) -> Self {
        Self {
            scheme: option.scheme.clone(),
            network: option.network.clone(),
            asset: option.asset.clone(),
            pay_to: option.pay_to.clone(),
            max_timeout_seconds: option.max_timeout_seconds,
            extra_name: option.extra.as_ref().and_then(|e| e.name.clone()),
            extra_version: option.extra.as_ref().and_then(|e| e.version.clone()),
            resource_url: resource.map(|r| r.url.clone()),
            resource_description: resource.map(|r| r.description.clone()),
        }
    }
}

struct Entry {
    params: PaymentParams,
    cached_at: Instant,
}

/// Endpoint path → payment parameters, with TTL eviction on read
pub struct PaymentCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl PaymentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh parameters for an endpoint; expired entries are evicted here
    pub fn get(&self, path: &str) -> Option<PaymentParams> {
        let expired = match self.entries.get(path) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => return Some(entry.params.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            drop(self.entries.remove(path));
            tracing::debug!(path, "evicted expired payment parameters");
        }
        None
    }

    /// Record the accepted parameters for an endpoint
    pub fn set(&self, path: &str, params: PaymentParams) {
        self.entries.insert(
            path.to_owned(),
            Entry {
                params,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop an endpoint's parameters (after a rejected pre-auth)
    pub fn invalidate(&self, path: &str) {
        drop(self.entries.remove(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PaymentParams {
        PaymentParams {
            scheme: "exact".to_owned(),
            network: "eip155:8453".to_owned(),
            asset: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_owned(),
            pay_to: "0x1111111111111111111111111111111111111111".to_owned(),
            max_timeout_seconds: Some(120),
            extra_name: None,
            extra_version: None,
            resource_url: None,
            resource_description: None,
        }
    }

    #[test]
    fn set_then_get() {
        let cache = PaymentCache::new(Duration::from_secs(3600));
        cache.set("/v1/chat/completions", params());
        let got = cache.get("/v1/chat/completions").unwrap();
        assert_eq!(got.pay_to, params().pay_to);
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = PaymentCache::new(Duration::from_millis(0));
        cache.set("/v1/chat/completions", params());
        assert!(cache.get("/v1/chat/completions").is_none());
        // The entry is gone, not merely hidden
        assert!(cache.entries.get("/v1/chat/completions").is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = PaymentCache::new(Duration::from_secs(3600));
        cache.set("/a", params());
        cache.invalidate("/a");
        assert!(cache.get("/a").is_none());
    }
}
