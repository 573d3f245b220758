//! Degraded-response and provider-error detection
//!
//! An upstream 200 is not always a usable completion: overloaded
//! providers substitute placeholder text, and looping models emit
//! near-identical lines. Both are treated as a 503 so the fallback chain
//! advances. Provider errors hiding in non-error bodies are caught by a
//! configurable regex set.

use std::collections::HashMap;

use blockrun_config::DegradedConfig;
use http::StatusCode;
use regex::RegexSet;
use serde_json::Value;

/// Upstream statuses that count as provider errors (retryable)
const PROVIDER_ERROR_STATUSES: [u16; 10] = [400, 401, 402, 403, 413, 429, 500, 502, 503, 504];

/// Compiled detection state
pub struct DegradedDetector {
    config: DegradedConfig,
    provider_patterns: RegexSet,
}

impl DegradedDetector {
    /// Compile the configured patterns
    ///
    /// # Errors
    ///
    /// Returns an error if a provider-error pattern is not valid regex
    pub fn new(config: DegradedConfig) -> anyhow::Result<Self> {
        let case_insensitive: Vec<String> = config
            .provider_error_patterns
            .iter()
            .map(|p| format!("(?i){p}"))
            .collect();
        let provider_patterns = RegexSet::new(&case_insensitive)?;
        Ok(Self {
            config,
            provider_patterns,
        })
    }

    /// Whether a status code is a retryable provider error
    pub fn is_provider_error_status(status: StatusCode) -> bool {
        PROVIDER_ERROR_STATUSES.contains(&status.as_u16())
    }

    /// Whether body text matches a known provider-error pattern
    pub fn matches_provider_error(&self, text: &str) -> bool {
        self.provider_patterns.is_match(text)
    }

    /// Whether a 200 body is actually a degraded response
    pub fn is_degraded(&self, body: &[u8]) -> bool {
        let text = String::from_utf8_lossy(body);

        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let content = parsed
            .as_ref()
            .and_then(assistant_content)
            .unwrap_or_else(|| text.to_string());

        // Overload placeholders substituted by the aggregator
        for marker in &self.config.overload_markers {
            if content.contains(marker.as_str()) {
                tracing::warn!(marker = %marker, "overload placeholder in 200 response");
                return true;
            }
        }

        if self.is_repetition_loop(&content) {
            return true;
        }

        // Error object smuggled inside a 200
        if let Some(json) = &parsed
            && let Some(error) = json.get("error")
            && self.matches_provider_error(&error.to_string())
        {
            return true;
        }

        false
    }

    /// Known loop phrases and the line-repetition heuristic
    fn is_repetition_loop(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        let phrase_hits = self
            .config
            .loop_patterns
            .iter()
            .filter(|p| lowered.contains(p.as_str()))
            .count();
        if phrase_hits >= 2 {
            tracing::warn!(phrase_hits, "repetitive-loop phrases in response");
            return true;
        }

        let lines: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() < self.config.min_lines {
            return false;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for line in &lines {
            *counts.entry(line).or_insert(0) += 1;
        }
        let max_repeat = counts.values().copied().max().unwrap_or(0);
        let unique_ratio = counts.len() as f64 / lines.len() as f64;

        if max_repeat >= self.config.max_repeat && unique_ratio <= self.config.unique_ratio {
            tracing::warn!(max_repeat, unique_ratio, lines = lines.len(), "line repetition in response");
            return true;
        }

        false
    }
}

/// Assistant message content from a chat completion body
fn assistant_content(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}
