use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed weight table, unordered tier
    /// boundaries, invalid detection patterns, or an out-of-range
    /// context headroom
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_routing()?;
        self.validate_degraded()?;
        Ok(())
    }

    fn validate_routing(&self) -> anyhow::Result<()> {
        let total = self.routing.weights.total();
        if (total - 1.0).abs() > 0.05 {
            anyhow::bail!("routing.weights must sum to approximately 1.0 (got {total:.3})");
        }

        let b = &self.routing.boundaries;
        if !(b.b1 < b.b2 && b.b2 < b.b3) {
            anyhow::bail!("routing.boundaries must satisfy b1 < b2 < b3");
        }

        if self.routing.context_headroom < 1.0 {
            anyhow::bail!("routing.context_headroom must be at least 1.0");
        }

        if self.routing.max_fallback_attempts == 0 {
            anyhow::bail!("routing.max_fallback_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.routing.confidence_threshold) {
            anyhow::bail!("routing.confidence_threshold must be within [0, 1]");
        }

        Ok(())
    }

    fn validate_degraded(&self) -> anyhow::Result<()> {
        for pattern in &self.degraded.provider_error_patterns {
            regex::Regex::new(&format!("(?i){pattern}"))
                .map_err(|e| anyhow::anyhow!("invalid degraded.provider_error_patterns entry `{pattern}`: {e}"))?;
        }

        if !(0.0..=1.0).contains(&self.degraded.unique_ratio) {
            anyhow::bail!("degraded.unique_ratio must be within [0, 1]");
        }

        Ok(())
    }
}
