use serde::Deserialize;

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseCacheConfig {
    /// Whether caching is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of cached responses
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Default TTL in seconds for cached responses
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Maximum size in bytes of a single cached body
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: usize,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_max_size(),
            default_ttl_seconds: default_ttl_seconds(),
            max_item_bytes: default_max_item_bytes(),
        }
    }
}

/// Request deduplication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// How long completed responses are replayed to duplicates, in seconds
    #[serde(default = "default_completed_ttl")]
    pub completed_ttl_seconds: u64,
    /// Maximum size in bytes of a body kept for replay
    #[serde(default = "default_max_item_bytes")]
    pub max_body_bytes: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            completed_ttl_seconds: default_completed_ttl(),
            max_body_bytes: default_max_item_bytes(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_size() -> usize {
    200
}

const fn default_ttl_seconds() -> u64 {
    600
}

const fn default_max_item_bytes() -> usize {
    1024 * 1024
}

const fn default_completed_ttl() -> u64 {
    30
}
