use serde::Deserialize;

/// Session pinning configuration
///
/// When enabled, requests carrying the session header reuse the model
/// chosen for the first request of the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Whether session pinning is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Idle timeout in seconds before a session is evicted
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Request header carrying the session id
    #[serde(default = "default_header")]
    pub header_name: String,
    /// Interval of the background eviction sweep, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: default_timeout(),
            header_name: default_header(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

const fn default_timeout() -> u64 {
    30 * 60
}

fn default_header() -> String {
    "x-session-id".to_owned()
}

const fn default_sweep_interval() -> u64 {
    5 * 60
}
