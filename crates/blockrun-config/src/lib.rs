#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod degraded;
mod env;
mod loader;
pub mod payment;
pub mod routing;
pub mod server;
pub mod session;

use serde::Deserialize;

pub use cache::*;
pub use degraded::*;
pub use payment::*;
pub use routing::*;
pub use server::*;
pub use session::*;

/// Top-level proxy configuration
///
/// Every section has compiled-in defaults; an empty config file yields a
/// working proxy.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Classifier and model-selection configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Payment and balance configuration
    #[serde(default)]
    pub payment: PaymentConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: ResponseCacheConfig,
    /// Request deduplication configuration
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Session pinning configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Degraded-response detection configuration
    #[serde(default)]
    pub degraded: DegradedConfig,
    /// Context compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,
}

/// Loss-tolerant context compression applied before forwarding
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Whether compression is applied at all
    #[serde(default)]
    pub enabled: bool,
    /// Body size in bytes above which compression kicks in
    #[serde(default = "default_compression_threshold")]
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_bytes: default_compression_threshold(),
        }
    }
}

fn default_compression_threshold() -> usize {
    180 * 1024
}
