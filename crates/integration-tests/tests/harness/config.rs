//! Test configuration builder

use blockrun_config::Config;
use url::Url;

/// Builds a proxy config pointed at the harness mocks
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(upstream_url: &str) -> Self {
        let mut config = Config::default();
        config.server.upstream_url = Url::parse(upstream_url).expect("valid mock url");
        // Tests default to no balance gating; individual tests opt back in
        config.payment.skip_balance_check = true;
        Self { config }
    }

    /// Gate on balance reads against a mock RPC node
    pub fn with_balance_rpc(mut self, rpc_url: &str) -> Self {
        self.config.payment.skip_balance_check = false;
        self.config.payment.rpc_url = Url::parse(rpc_url).expect("valid rpc url");
        self
    }

    /// Disable the completed-request replay window
    pub fn without_dedup_replay(mut self) -> Self {
        self.config.dedup.completed_ttl_seconds = 0;
        self
    }

    pub fn with_cache_disabled(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    pub fn with_sessions(mut self) -> Self {
        self.config.session.enabled = true;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
