//! 15-dimension weighted prompt scorer
//!
//! Each dimension produces a bounded raw score from keyword or pattern
//! matching; the weighted sum is mapped to a tier through configurable
//! boundaries, and a sigmoid over the distance to the nearest boundary
//! calibrates the confidence. Deterministic: same inputs, same output.

use std::sync::OnceLock;

use blockrun_config::RoutingConfig;
use blockrun_core::Tier;
use regex::Regex;

use crate::keywords::{KeywordSets, match_count};

/// Classifier input, already reduced to the relevant strings
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    /// Content of the last user message
    pub user_prompt: &'a str,
    /// Content of the first system message, if any
    pub system_prompt: Option<&'a str>,
    /// Estimated input tokens over the combined text
    pub estimated_input_tokens: usize,
}

/// Classifier output
#[derive(Debug, Clone)]
pub struct Classification {
    /// Aggregate weighted score
    pub score: f64,
    /// Classified tier, or `None` when the confidence fell below the
    /// ambiguity threshold
    pub tier: Option<Tier>,
    /// Calibrated confidence in `[0, 1]`
    pub confidence: f64,
    /// Human-readable labels of the dimensions that fired
    pub signals: Vec<String>,
    /// Agentic sub-score in `[0, 1]`, exposed for tier-table switching
    pub agentic_score: f64,
}

impl Classification {
    /// One-line summary used in routing decision reasoning strings
    pub fn summary(&self) -> String {
        if self.signals.is_empty() {
            format!("score {:.2}; no signals", self.score)
        } else {
            format!("score {:.2}; {}", self.score, self.signals.join(", "))
        }
    }
}

/// Classify a prompt
///
/// Total over all inputs: empty prompts score negative on the length
/// dimension and land in the simple tier.
pub fn classify(input: &ClassifierInput<'_>, config: &RoutingConfig, keywords: &KeywordSets) -> Classification {
    let user_lower = input.user_prompt.to_lowercase();
    let combined_lower = match input.system_prompt {
        Some(system) => format!("{}\n{}", user_lower, system.to_lowercase()),
        None => user_lower.clone(),
    };

    let w = &config.weights;
    let mut score = 0.0;
    let mut signals = Vec::new();

    // tokenCount: length bucket
    let length_score = if input.estimated_input_tokens < config.simple_token_threshold {
        signals.push("short prompt".to_owned());
        -1.0
    } else if input.estimated_input_tokens > config.complex_token_threshold {
        signals.push("long prompt".to_owned());
        1.0
    } else {
        0.0
    };
    score += w.token_count * length_score;

    score += w.code_presence * keyword_dim(&combined_lower, &keywords.code, &[(2, 1.0), (1, 0.5)], "code", &mut signals);

    // reasoningMarkers runs on the user text only
    let (reasoning_hits, reasoning_matched) = match_count(&user_lower, &keywords.reasoning);
    let reasoning_score = graded(reasoning_hits, &[(2, 1.0), (1, 0.7)]);
    if reasoning_score != 0.0 {
        signals.push(signal_label("reasoning", &reasoning_matched));
    }
    score += w.reasoning_markers * reasoning_score;

    score += w.technical_terms
        * keyword_dim(&combined_lower, &keywords.technical, &[(4, 1.0), (2, 0.5)], "technical", &mut signals);
    score += w.creative_markers
        * keyword_dim(&combined_lower, &keywords.creative, &[(2, 0.7), (1, 0.5)], "creative", &mut signals);
    score += w.simple_indicators
        * keyword_dim(&combined_lower, &keywords.simple, &[(1, -1.0)], "simple indicator", &mut signals);

    if multi_step_re().is_match(&combined_lower) {
        signals.push("multi-step structure".to_owned());
        score += w.multi_step_patterns * 0.5;
    }

    let questions = combined_lower.chars().filter(|&c| c == '?' || c == '？').count();
    if questions > 3 {
        signals.push(format!("many questions ({questions})"));
        score += w.question_complexity * 0.5;
    }

    score += w.imperative_verbs
        * keyword_dim(&combined_lower, &keywords.imperative, &[(2, 0.5), (1, 0.3)], "imperative", &mut signals);
    score += w.constraint_count
        * keyword_dim(&combined_lower, &keywords.constraint, &[(2, 0.7), (1, 0.3)], "constraints", &mut signals);
    score += w.output_format
        * keyword_dim(&combined_lower, &keywords.output_format, &[(2, 0.7), (1, 0.4)], "output format", &mut signals);
    score += w.reference_complexity
        * keyword_dim(&combined_lower, &keywords.reference, &[(2, 0.5), (1, 0.3)], "references", &mut signals);
    score += w.negation_complexity
        * keyword_dim(&combined_lower, &keywords.negation, &[(3, 0.5), (2, 0.3)], "negations", &mut signals);
    score += w.domain_specificity
        * keyword_dim(&combined_lower, &keywords.domain, &[(2, 0.8), (1, 0.5)], "specialized domain", &mut signals);

    let (agentic_hits, agentic_matched) = match_count(&combined_lower, &keywords.agentic);
    let agentic_score = graded(agentic_hits, &[(4, 1.0), (3, 0.6), (1, 0.2)]);
    if agentic_score != 0.0 {
        signals.push(signal_label("agentic", &agentic_matched));
    }
    score += w.agentic_task * agentic_score;

    // Direct override: two or more reasoning markers in the user text
    // force the reasoning tier regardless of the aggregate score.
    if reasoning_hits >= 2 {
        let k = config.sigmoid_steepness;
        let confidence = sigmoid(k * score.max(0.3)).max(0.85);
        return Classification {
            score,
            tier: Some(Tier::Reasoning),
            confidence,
            signals,
            agentic_score,
        };
    }

    let (tier, distance) = map_tier(score, config);
    let confidence = sigmoid(config.sigmoid_steepness * distance);
    let tier = (confidence >= config.confidence_threshold).then_some(tier);

    Classification {
        score,
        tier,
        confidence,
        signals,
        agentic_score,
    }
}

/// Map a score to a tier and the distance to the nearest boundary
fn map_tier(score: f64, config: &RoutingConfig) -> (Tier, f64) {
    let b = &config.boundaries;
    if score < b.b1 {
        (Tier::Simple, b.b1 - score)
    } else if score < b.b2 {
        (Tier::Medium, (score - b.b1).min(b.b2 - score))
    } else if score < b.b3 {
        (Tier::Complex, (score - b.b2).min(b.b3 - score))
    } else {
        (Tier::Reasoning, score - b.b3)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Raw score for a hit count against descending `(min_hits, score)` rungs
fn graded(hits: usize, rungs: &[(usize, f64)]) -> f64 {
    for &(min_hits, value) in rungs {
        if hits >= min_hits {
            return value;
        }
    }
    0.0
}

/// Score one keyword dimension, recording a signal when it fires
fn keyword_dim(
    lowered: &str,
    list: &[String],
    rungs: &[(usize, f64)],
    label: &str,
    signals: &mut Vec<String>,
) -> f64 {
    let (hits, matched) = match_count(lowered, list);
    let value = graded(hits, rungs);
    if value != 0.0 {
        signals.push(signal_label(label, &matched));
    }
    value
}

fn signal_label(label: &str, matched: &[&str]) -> String {
    let shown: Vec<&str> = matched.iter().take(3).copied().collect();
    format!("{label} ({})", shown.join(", "))
}

fn multi_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)first\b.{0,80}?\bthen\b|step\s*\d|\n\s*\d+[.)]\s|首先.{0,40}然后|まず.{0,40}次に|сначала.{0,60}затем",
        )
        .expect("must be valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(user: &str) -> Classification {
        let config = RoutingConfig::default();
        let keywords = KeywordSets::default();
        let tokens = blockrun_core::estimate_tokens(user);
        classify(
            &ClassifierInput {
                user_prompt: user,
                system_prompt: None,
                estimated_input_tokens: tokens,
            },
            &config,
            &keywords,
        )
    }

    #[test]
    fn trivial_question_is_simple() {
        let c = input("What is the capital of France?");
        assert_eq!(c.tier, Some(Tier::Simple));
        assert!(c.confidence >= 0.7, "confidence {}", c.confidence);
        assert!(c.signals.iter().any(|s| s.starts_with("simple indicator")));
    }

    #[test]
    fn empty_prompt_is_simple() {
        let c = input("");
        assert_eq!(c.tier, Some(Tier::Simple));
    }

    #[test]
    fn two_reasoning_markers_force_reasoning() {
        let c = input("Prove step by step that sqrt(2) is irrational.");
        assert_eq!(c.tier, Some(Tier::Reasoning));
        assert!(c.confidence >= 0.85);
        assert!(c.signals.iter().any(|s| s.starts_with("reasoning")));
    }

    #[test]
    fn classification_is_deterministic() {
        let a = input("Refactor this function to use a database connection pool, step by step");
        let b = input("Refactor this function to use a database connection pool, step by step");
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.signals, b.signals);
    }

    #[test]
    fn agentic_score_rises_with_hits() {
        let low = input("please execute this");
        let high = input("use the tool to browse the file system, then execute the workflow in the terminal");
        assert!(low.agentic_score <= high.agentic_score);
        assert!(high.agentic_score >= 0.6, "agentic {}", high.agentic_score);
    }

    #[test]
    fn multi_step_pattern_fires() {
        let c = input("First install the dependencies, then run the migration, and summarize the logs in detail so we can review them together afterwards");
        assert!(c.signals.iter().any(|s| s == "multi-step structure"));
    }

    #[test]
    fn ambiguous_scores_yield_no_tier() {
        // Push the score right onto a boundary: medium-length text with no
        // keyword hits lands at exactly 0.0 (distance 0 from b1).
        let filler = "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(8);
        let c = input(&filler);
        assert!(c.tier.is_none(), "expected ambiguous, got {:?} at {}", c.tier, c.confidence);
        assert!(c.confidence < 0.7);
    }

    #[test]
    fn sigmoid_shape() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(5.0) > 0.99);
        assert!(sigmoid(-5.0) < 0.01);
    }
}
