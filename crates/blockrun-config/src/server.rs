use serde::Deserialize;
use url::Url;

/// HTTP server and upstream configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Port to listen on (loopback only)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream aggregator base URL
    #[serde(default = "default_upstream_url")]
    pub upstream_url: Url,
    /// Wall-clock timeout per upstream attempt, in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
    /// Socket-level read timeout, in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Heartbeat cadence for streaming responses, in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream_url: default_upstream_url(),
            attempt_timeout_seconds: default_attempt_timeout(),
            read_timeout_seconds: default_read_timeout(),
            heartbeat_seconds: default_heartbeat(),
        }
    }
}

const fn default_port() -> u16 {
    8402
}

fn default_upstream_url() -> Url {
    Url::parse("https://gateway.blockrun.ai").expect("valid default URL")
}

const fn default_attempt_timeout() -> u64 {
    180
}

const fn default_read_timeout() -> u64 {
    300
}

const fn default_heartbeat() -> u64 {
    2
}
