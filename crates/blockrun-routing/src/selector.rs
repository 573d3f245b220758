//! Tier → model selection with cost accounting
//!
//! Maps a classified tier to the primary model of the active profile's
//! tier table, prices the request, and reports the savings against a
//! fixed premium reference model. Fallback chains are filtered by
//! declared context window before the proxy walks them.

use blockrun_config::TierTable;
use blockrun_core::{ModelRegistry, Tier};
use serde::Serialize;

use crate::RoutingProfile;
use crate::error::RoutingError;

/// How the routing decision was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMethod {
    /// Rule-based classifier
    Rules,
    /// Delegated to an LLM judge
    Llm,
}

/// Result of a routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    /// Selected model id
    pub model: String,
    /// Classified tier
    pub tier: Tier,
    /// Classifier confidence in `[0, 1]`
    pub confidence: f64,
    /// How the decision was made
    pub method: RoutingMethod,
    /// Human-readable explanation (score and active signals)
    pub reasoning: String,
    /// Estimated request cost in USD
    pub estimated_cost: f64,
    /// Cost of the same request on the premium reference model
    pub baseline_cost: f64,
    /// `max(0, (baseline - cost) / baseline)`; 0 under the premium profile
    pub savings: f64,
}

/// Select the primary model for a tier and price the request
#[allow(clippy::too_many_arguments)]
pub fn select_model(
    tier: Tier,
    confidence: f64,
    method: RoutingMethod,
    reasoning: String,
    table: &TierTable,
    registry: &ModelRegistry,
    est_input_tokens: usize,
    max_output_tokens: u32,
    profile: RoutingProfile,
    premium_reference: &str,
) -> Result<RoutingDecision, RoutingError> {
    let model_id = &table.chain(tier).primary;
    let model = registry.find(model_id).ok_or_else(|| RoutingError::UnknownModel {
        model: model_id.clone(),
    })?;

    let estimated_cost = model.estimate_cost(est_input_tokens, max_output_tokens as usize);

    let baseline_cost = registry
        .find(premium_reference)
        .map_or(0.0, |reference| reference.estimate_cost(est_input_tokens, max_output_tokens as usize));

    let savings = if profile == RoutingProfile::Premium || baseline_cost == 0.0 {
        0.0
    } else {
        ((baseline_cost - estimated_cost) / baseline_cost).max(0.0)
    };

    tracing::debug!(
        model = %model.id,
        tier = %tier,
        confidence,
        estimated_cost,
        savings,
        "model selected"
    );

    Ok(RoutingDecision {
        model: model.id.clone(),
        tier,
        confidence,
        method,
        reasoning,
        estimated_cost,
        baseline_cost,
        savings,
    })
}

/// Full fallback chain for a tier: primary first, declared order after
pub fn fallback_chain(tier: Tier, table: &TierTable) -> Vec<String> {
    let chain = table.chain(tier);
    let mut models = Vec::with_capacity(1 + chain.fallback.len());
    models.push(chain.primary.clone());
    models.extend(chain.fallback.iter().cloned());
    models
}

/// Fallback chain filtered by declared context window
///
/// Keeps only models whose context window covers the estimated total
/// tokens with the configured headroom. When the filter would empty the
/// chain, returns it unfiltered — a too-small window beats no model.
pub fn fallback_chain_filtered(
    tier: Tier,
    table: &TierTable,
    est_total_tokens: usize,
    registry: &ModelRegistry,
    headroom: f64,
) -> Vec<String> {
    let chain = fallback_chain(tier, table);
    let required = (est_total_tokens as f64) * headroom;

    let filtered: Vec<String> = chain
        .iter()
        .filter(|id| registry.context_window(id).is_some_and(|window| f64::from(window) >= required))
        .cloned()
        .collect();

    if filtered.is_empty() {
        tracing::warn!(
            tier = %tier,
            est_total_tokens,
            "no model in chain satisfies the context window, using unfiltered chain"
        );
        chain
    } else {
        filtered
    }
}
