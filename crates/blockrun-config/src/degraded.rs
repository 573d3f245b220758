use serde::Deserialize;

/// Degraded-response detection configuration
///
/// A 200 from the upstream is downgraded to a retryable provider error
/// when its body matches any of these signatures. Thresholds are exposed
/// because the loop heuristic is tuned per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DegradedConfig {
    /// Minimum trimmed lines before the repetition heuristic applies
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,
    /// A line repeated at least this many times counts as looping
    #[serde(default = "default_max_repeat")]
    pub max_repeat: usize,
    /// Unique-line ratio at or below which the content counts as looping
    #[serde(default = "default_unique_ratio")]
    pub unique_ratio: f64,
    /// Literal placeholders the aggregator substitutes for overloaded models
    #[serde(default = "default_overload_markers")]
    pub overload_markers: Vec<String>,
    /// Known repetitive-loop phrases (two or more occurrences trigger)
    #[serde(default = "default_loop_patterns")]
    pub loop_patterns: Vec<String>,
    /// Regexes identifying provider errors hidden in non-error bodies
    #[serde(default = "default_provider_error_patterns")]
    pub provider_error_patterns: Vec<String>,
}

impl Default for DegradedConfig {
    fn default() -> Self {
        Self {
            min_lines: default_min_lines(),
            max_repeat: default_max_repeat(),
            unique_ratio: default_unique_ratio(),
            overload_markers: default_overload_markers(),
            loop_patterns: default_loop_patterns(),
            provider_error_patterns: default_provider_error_patterns(),
        }
    }
}

const fn default_min_lines() -> usize {
    8
}

const fn default_max_repeat() -> usize {
    3
}

const fn default_unique_ratio() -> f64 {
    0.45
}

fn default_overload_markers() -> Vec<String> {
    vec!["AI service is temporarily overloaded".to_owned()]
}

fn default_loop_patterns() -> Vec<String> {
    [
        "the boxed is the response",
        "the response is the text",
        "the answer is the answer",
        "the final answer is the final",
    ]
    .iter()
    .map(|&s| s.to_owned())
    .collect()
}

fn default_provider_error_patterns() -> Vec<String> {
    [
        "billing",
        "insufficient.*balance",
        "credits",
        "quota",
        "rate.?limit",
        "model.*unavailable",
        "service.*unavailable",
        "capacity",
        "overloaded",
        "temporarily.*unavailable",
        "request too large",
        "payload too large",
    ]
    .iter()
    .map(|&s| s.to_owned())
    .collect()
}
