//! Model registry and alias resolution
//!
//! A single compiled-in registry of model descriptors plus a short-name
//! alias map. Requested model names pass through [`ModelRegistry::resolve`]
//! before any routing decision; resolution is a fixed point.

use std::collections::HashMap;

use serde::Serialize;

/// Brand prefix stripped from requested model names (`blockrun/auto` → `auto`)
pub const BRAND_PREFIX: &str = "blockrun/";

/// Static description of one upstream model
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    /// Stable id in `provider/name` form
    pub id: String,
    /// Human-readable display name
    pub display_name: String,
    /// Upstream version tag
    pub version: String,
    /// Cost per million input tokens (USD)
    pub input_per_mtok: f64,
    /// Cost per million output tokens (USD)
    pub output_per_mtok: f64,
    /// Context window in tokens
    pub context_window: u32,
    /// Maximum output tokens per completion
    pub max_output_tokens: u32,
    /// Whether the model emits reasoning traces
    pub reasoning: bool,
    /// Whether the model accepts image input
    pub vision: bool,
    /// Whether the model is tuned for multi-step tool use
    pub agentic: bool,
}

impl ModelDescriptor {
    /// Estimate the cost of a request in USD
    pub fn estimate_cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        let input = (input_tokens as f64) * self.input_per_mtok;
        let output = (output_tokens as f64) * self.output_per_mtok;
        (input + output) / 1_000_000.0
    }

    /// Same estimate in micro-USD, rounded up
    pub fn estimate_cost_micros(&self, input_tokens: usize, output_tokens: usize) -> u64 {
        (self.estimate_cost(input_tokens, output_tokens) * 1_000_000.0).ceil() as u64
    }
}

/// Registry of every model the proxy can route to
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    /// Build the compiled-in registry
    #[allow(clippy::too_many_lines)]
    pub fn builtin() -> Self {
        let models = vec![
            descriptor("openai/gpt-4o-mini", "GPT-4o mini", "2024-07-18", 0.15, 0.60, 128_000, 16_384, false, true, false),
            descriptor("openai/gpt-4o", "GPT-4o", "2024-11-20", 2.50, 10.00, 128_000, 16_384, false, true, true),
            descriptor("openai/o3", "o3", "2025-04-16", 2.00, 8.00, 200_000, 100_000, true, true, true),
            descriptor("openai/o4-mini", "o4-mini", "2025-04-16", 1.10, 4.40, 200_000, 100_000, true, true, false),
            descriptor("anthropic/claude-sonnet-4", "Claude Sonnet 4", "2025-05-14", 3.00, 15.00, 200_000, 64_000, false, true, true),
            descriptor("anthropic/claude-opus-4", "Claude Opus 4", "2025-05-14", 15.00, 75.00, 200_000, 32_000, true, true, true),
            descriptor("deepseek/deepseek-chat", "DeepSeek V3", "2025-03-24", 0.14, 0.28, 128_000, 8_192, false, false, false),
            descriptor("deepseek/deepseek-reasoner", "DeepSeek R1", "2025-05-28", 0.55, 2.19, 128_000, 65_536, true, false, false),
            descriptor("google/gemini-2.5-flash", "Gemini 2.5 Flash", "2025-06-17", 0.30, 2.50, 1_048_576, 65_536, false, true, false),
            descriptor("meta/llama-3.1-8b", "Llama 3.1 8B", "2024-07-23", 0.0, 0.0, 131_072, 8_192, false, false, false),
        ];

        let mut aliases = HashMap::new();
        for (short, canonical) in [
            ("gpt-4o-mini", "openai/gpt-4o-mini"),
            ("gpt-4o", "openai/gpt-4o"),
            ("o3", "openai/o3"),
            ("o4-mini", "openai/o4-mini"),
            ("sonnet", "anthropic/claude-sonnet-4"),
            ("claude-sonnet-4", "anthropic/claude-sonnet-4"),
            ("opus", "anthropic/claude-opus-4"),
            ("claude-opus-4", "anthropic/claude-opus-4"),
            ("deepseek", "deepseek/deepseek-chat"),
            ("deepseek-chat", "deepseek/deepseek-chat"),
            ("r1", "deepseek/deepseek-reasoner"),
            ("deepseek-reasoner", "deepseek/deepseek-reasoner"),
            ("gemini-flash", "google/gemini-2.5-flash"),
            ("llama", "meta/llama-3.1-8b"),
        ] {
            aliases.insert(short.to_owned(), canonical.to_owned());
        }

        Self { models, aliases }
    }

    /// All registered models
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Find a model by canonical id
    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Context window for a model, if known
    pub fn context_window(&self, id: &str) -> Option<u32> {
        self.find(id).map(|m| m.context_window)
    }

    /// Register an additional model, replacing any existing entry with the same id
    pub fn insert(&mut self, model: ModelDescriptor) {
        self.models.retain(|m| m.id != model.id);
        self.models.push(model);
    }

    /// Register an alias
    pub fn insert_alias(&mut self, short: &str, canonical: &str) {
        self.aliases.insert(short.to_owned(), canonical.to_owned());
    }

    /// Resolve a requested model name to its canonical form
    ///
    /// Lowercases and trims, strips the `blockrun/` brand prefix, then
    /// follows the alias map. The result is a fixed point:
    /// `resolve(resolve(x)) == resolve(x)`. Routing-profile names
    /// (`free`, `eco`, `auto`, `premium`) pass through unchanged for the
    /// proxy core to interpret.
    pub fn resolve(&self, requested: &str) -> String {
        let mut name = requested.trim().to_lowercase();
        if let Some(stripped) = name.strip_prefix(BRAND_PREFIX) {
            name = stripped.to_owned();
        }
        match self.aliases.get(&name) {
            Some(canonical) => canonical.clone(),
            None => name,
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn descriptor(
    id: &str,
    display_name: &str,
    version: &str,
    input_per_mtok: f64,
    output_per_mtok: f64,
    context_window: u32,
    max_output_tokens: u32,
    reasoning: bool,
    vision: bool,
    agentic: bool,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_owned(),
        display_name: display_name.to_owned(),
        version: version.to_owned(),
        input_per_mtok,
        output_per_mtok,
        context_window,
        max_output_tokens,
        reasoning,
        vision,
        agentic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution_is_fixed_point() {
        let registry = ModelRegistry::builtin();
        for requested in ["sonnet", "blockrun/sonnet", "GPT-4o-Mini", " opus ", "auto", "blockrun/auto"] {
            let once = registry.resolve(requested);
            let twice = registry.resolve(&once);
            assert_eq!(once, twice, "resolve not idempotent for {requested}");
        }
    }

    #[test]
    fn brand_prefix_is_stripped() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.resolve("blockrun/auto"), "auto");
        assert_eq!(registry.resolve("blockrun/sonnet"), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn canonical_ids_pass_through() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.resolve("openai/gpt-4o"), "openai/gpt-4o");
    }

    #[test]
    fn cost_estimate() {
        let registry = ModelRegistry::builtin();
        let mini = registry.find("openai/gpt-4o-mini").unwrap();
        // 1M input + 0.5M output = 0.15 + 0.30
        let cost = mini.estimate_cost(1_000_000, 500_000);
        assert!((cost - 0.45).abs() < 1e-9);
    }

    #[test]
    fn micro_cost_rounds_up() {
        let registry = ModelRegistry::builtin();
        let mini = registry.find("openai/gpt-4o-mini").unwrap();
        // 1 input token = 0.15e-6 USD = 0.15 µUSD, rounds to 1
        assert_eq!(mini.estimate_cost_micros(1, 0), 1);
    }

    #[test]
    fn free_model_is_free() {
        let registry = ModelRegistry::builtin();
        let free = registry.find("meta/llama-3.1-8b").unwrap();
        assert_eq!(free.estimate_cost_micros(100_000, 8_192), 0);
    }
}
