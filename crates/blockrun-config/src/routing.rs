use blockrun_core::Tier;
use indexmap::IndexMap;
use serde::Deserialize;

/// Classifier and model-selection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Per-dimension weights of the rule classifier
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Tier boundaries on the aggregate score
    #[serde(default)]
    pub boundaries: TierBoundaries,
    /// Sigmoid steepness for confidence calibration
    #[serde(default = "default_sigmoid_steepness")]
    pub sigmoid_steepness: f64,
    /// Confidence below which the tier is treated as ambiguous
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Tier applied when classification is ambiguous
    #[serde(default = "default_ambiguous_tier")]
    pub ambiguous_default_tier: Tier,
    /// Token count below which the length dimension scores simple
    #[serde(default = "default_simple_tokens")]
    pub simple_token_threshold: usize,
    /// Token count above which the length dimension scores complex
    #[serde(default = "default_complex_tokens")]
    pub complex_token_threshold: usize,
    /// Estimated input tokens above which the tier is forced to complex
    #[serde(default = "default_force_complex")]
    pub max_tokens_force_complex: usize,
    /// Minimum tier when the system prompt requests structured output
    #[serde(default = "default_structured_min_tier")]
    pub structured_output_min_tier: Tier,
    /// Always use the agentic tier table under the auto profile
    #[serde(default)]
    pub agentic_mode: bool,
    /// Agentic sub-score at which the agentic tier table engages
    #[serde(default = "default_agentic_threshold")]
    pub agentic_threshold: f64,
    /// Model served under the free profile and on balance downgrade
    #[serde(default = "default_free_model")]
    pub free_model: String,
    /// Reference model for baseline cost and savings reporting
    #[serde(default = "default_premium_reference")]
    pub premium_reference_model: String,
    /// Maximum models tried per request
    #[serde(default = "default_max_attempts")]
    pub max_fallback_attempts: usize,
    /// Required context-window headroom over the estimated total tokens
    #[serde(default = "default_context_headroom")]
    pub context_headroom: f64,
    /// Messages kept (from the tail) when truncating history
    #[serde(default = "default_history_limit")]
    pub message_history_limit: usize,
    /// How long a rate-limited model is de-prioritized, in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    /// Keyword list overrides, merged over the compiled-in lists
    #[serde(default)]
    pub keywords: IndexMap<String, Vec<String>>,
    /// Per-profile tier tables
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            boundaries: TierBoundaries::default(),
            sigmoid_steepness: default_sigmoid_steepness(),
            confidence_threshold: default_confidence_threshold(),
            ambiguous_default_tier: default_ambiguous_tier(),
            simple_token_threshold: default_simple_tokens(),
            complex_token_threshold: default_complex_tokens(),
            max_tokens_force_complex: default_force_complex(),
            structured_output_min_tier: default_structured_min_tier(),
            agentic_mode: false,
            agentic_threshold: default_agentic_threshold(),
            free_model: default_free_model(),
            premium_reference_model: default_premium_reference(),
            max_fallback_attempts: default_max_attempts(),
            context_headroom: default_context_headroom(),
            message_history_limit: default_history_limit(),
            cooldown_seconds: default_cooldown(),
            keywords: IndexMap::new(),
            profiles: ProfilesConfig::default(),
        }
    }
}

/// Weight of each scoring dimension; the defaults sum to 1.0
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
    #[serde(default = "w_token_count")]
    pub token_count: f64,
    #[serde(default = "w_code_presence")]
    pub code_presence: f64,
    #[serde(default = "w_reasoning_markers")]
    pub reasoning_markers: f64,
    #[serde(default = "w_technical_terms")]
    pub technical_terms: f64,
    #[serde(default = "w_creative_markers")]
    pub creative_markers: f64,
    #[serde(default = "w_simple_indicators")]
    pub simple_indicators: f64,
    #[serde(default = "w_multi_step")]
    pub multi_step_patterns: f64,
    #[serde(default = "w_question_complexity")]
    pub question_complexity: f64,
    #[serde(default = "w_imperative_verbs")]
    pub imperative_verbs: f64,
    #[serde(default = "w_constraint_count")]
    pub constraint_count: f64,
    #[serde(default = "w_output_format")]
    pub output_format: f64,
    #[serde(default = "w_reference_complexity")]
    pub reference_complexity: f64,
    #[serde(default = "w_negation_complexity")]
    pub negation_complexity: f64,
    #[serde(default = "w_domain_specificity")]
    pub domain_specificity: f64,
    #[serde(default = "w_agentic_task")]
    pub agentic_task: f64,
}

impl ScoringWeights {
    /// Sum of all dimension weights
    pub fn total(&self) -> f64 {
        self.token_count
            + self.code_presence
            + self.reasoning_markers
            + self.technical_terms
            + self.creative_markers
            + self.simple_indicators
            + self.multi_step_patterns
            + self.question_complexity
            + self.imperative_verbs
            + self.constraint_count
            + self.output_format
            + self.reference_complexity
            + self.negation_complexity
            + self.domain_specificity
            + self.agentic_task
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            token_count: w_token_count(),
            code_presence: w_code_presence(),
            reasoning_markers: w_reasoning_markers(),
            technical_terms: w_technical_terms(),
            creative_markers: w_creative_markers(),
            simple_indicators: w_simple_indicators(),
            multi_step_patterns: w_multi_step(),
            question_complexity: w_question_complexity(),
            imperative_verbs: w_imperative_verbs(),
            constraint_count: w_constraint_count(),
            output_format: w_output_format(),
            reference_complexity: w_reference_complexity(),
            negation_complexity: w_negation_complexity(),
            domain_specificity: w_domain_specificity(),
            agentic_task: w_agentic_task(),
        }
    }
}

/// Score boundaries between adjacent tiers (`b1 < b2 < b3`)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierBoundaries {
    /// Simple/medium boundary
    #[serde(default)]
    pub b1: f64,
    /// Medium/complex boundary
    #[serde(default = "default_b2")]
    pub b2: f64,
    /// Complex/reasoning boundary
    #[serde(default = "default_b3")]
    pub b3: f64,
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            b1: 0.0,
            b2: default_b2(),
            b3: default_b3(),
        }
    }
}

/// Primary model plus ordered fallbacks for one tier
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelChain {
    /// Model tried first
    pub primary: String,
    /// Fallback models in order of preference
    #[serde(default)]
    pub fallback: Vec<String>,
}

impl ModelChain {
    fn new(primary: &str, fallback: &[&str]) -> Self {
        Self {
            primary: primary.to_owned(),
            fallback: fallback.iter().map(|&m| m.to_owned()).collect(),
        }
    }
}

/// Tier → model chain table for one routing profile
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierTable {
    pub simple: ModelChain,
    pub medium: ModelChain,
    pub complex: ModelChain,
    pub reasoning: ModelChain,
}

impl TierTable {
    /// Model chain for a tier
    pub fn chain(&self, tier: Tier) -> &ModelChain {
        match tier {
            Tier::Simple => &self.simple,
            Tier::Medium => &self.medium,
            Tier::Complex => &self.complex,
            Tier::Reasoning => &self.reasoning,
        }
    }
}

/// Tier tables for every non-free profile
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesConfig {
    #[serde(default = "default_eco_table")]
    pub eco: TierTable,
    #[serde(default = "default_auto_table")]
    pub auto: TierTable,
    #[serde(default = "default_premium_table")]
    pub premium: TierTable,
    /// Sub-table of `auto`, engaged when the agentic sub-score crosses
    /// the configured threshold
    #[serde(default = "default_agentic_table")]
    pub agentic: TierTable,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            eco: default_eco_table(),
            auto: default_auto_table(),
            premium: default_premium_table(),
            agentic: default_agentic_table(),
        }
    }
}

fn default_eco_table() -> TierTable {
    TierTable {
        simple: ModelChain::new("meta/llama-3.1-8b", &["deepseek/deepseek-chat"]),
        medium: ModelChain::new("deepseek/deepseek-chat", &["openai/gpt-4o-mini", "meta/llama-3.1-8b"]),
        complex: ModelChain::new("openai/gpt-4o-mini", &["deepseek/deepseek-chat", "google/gemini-2.5-flash"]),
        reasoning: ModelChain::new("deepseek/deepseek-reasoner", &["openai/o4-mini"]),
    }
}

fn default_auto_table() -> TierTable {
    TierTable {
        simple: ModelChain::new("openai/gpt-4o-mini", &["deepseek/deepseek-chat", "meta/llama-3.1-8b"]),
        medium: ModelChain::new("openai/gpt-4o", &["anthropic/claude-sonnet-4", "openai/gpt-4o-mini"]),
        complex: ModelChain::new(
            "anthropic/claude-sonnet-4",
            &["openai/gpt-4o", "google/gemini-2.5-flash", "anthropic/claude-opus-4"],
        ),
        reasoning: ModelChain::new("deepseek/deepseek-reasoner", &["openai/o4-mini", "openai/o3"]),
    }
}

fn default_premium_table() -> TierTable {
    TierTable {
        simple: ModelChain::new("openai/gpt-4o", &["anthropic/claude-sonnet-4"]),
        medium: ModelChain::new("anthropic/claude-sonnet-4", &["openai/gpt-4o"]),
        complex: ModelChain::new("anthropic/claude-opus-4", &["anthropic/claude-sonnet-4", "openai/o3"]),
        reasoning: ModelChain::new("openai/o3", &["anthropic/claude-opus-4", "deepseek/deepseek-reasoner"]),
    }
}

fn default_agentic_table() -> TierTable {
    TierTable {
        simple: ModelChain::new("anthropic/claude-sonnet-4", &["openai/gpt-4o"]),
        medium: ModelChain::new("anthropic/claude-sonnet-4", &["openai/gpt-4o", "openai/o4-mini"]),
        complex: ModelChain::new("anthropic/claude-sonnet-4", &["anthropic/claude-opus-4", "openai/o3"]),
        reasoning: ModelChain::new("openai/o3", &["anthropic/claude-opus-4"]),
    }
}

const fn default_sigmoid_steepness() -> f64 {
    12.0
}

const fn default_confidence_threshold() -> f64 {
    0.7
}

const fn default_ambiguous_tier() -> Tier {
    Tier::Medium
}

const fn default_simple_tokens() -> usize {
    50
}

const fn default_complex_tokens() -> usize {
    2000
}

const fn default_force_complex() -> usize {
    100_000
}

const fn default_structured_min_tier() -> Tier {
    Tier::Medium
}

const fn default_agentic_threshold() -> f64 {
    0.5
}

fn default_free_model() -> String {
    "meta/llama-3.1-8b".to_owned()
}

fn default_premium_reference() -> String {
    "anthropic/claude-opus-4".to_owned()
}

const fn default_max_attempts() -> usize {
    5
}

const fn default_context_headroom() -> f64 {
    1.1
}

const fn default_history_limit() -> usize {
    200
}

const fn default_cooldown() -> u64 {
    60
}

const fn default_b2() -> f64 {
    0.3
}

const fn default_b3() -> f64 {
    0.5
}

const fn w_token_count() -> f64 {
    0.08
}
const fn w_code_presence() -> f64 {
    0.15
}
const fn w_reasoning_markers() -> f64 {
    0.18
}
const fn w_technical_terms() -> f64 {
    0.10
}
const fn w_creative_markers() -> f64 {
    0.05
}
const fn w_simple_indicators() -> f64 {
    0.02
}
const fn w_multi_step() -> f64 {
    0.12
}
const fn w_question_complexity() -> f64 {
    0.05
}
const fn w_imperative_verbs() -> f64 {
    0.03
}
const fn w_constraint_count() -> f64 {
    0.04
}
const fn w_output_format() -> f64 {
    0.03
}
const fn w_reference_complexity() -> f64 {
    0.02
}
const fn w_negation_complexity() -> f64 {
    0.01
}
const fn w_domain_specificity() -> f64 {
    0.02
}
const fn w_agentic_task() -> f64 {
    0.04
}
