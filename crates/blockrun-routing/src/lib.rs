//! Rule-based request classification and model selection
//!
//! Classifies each prompt into a complexity tier with a 15-dimension
//! weighted scorer, calibrates a confidence with a sigmoid over the
//! distance to the nearest tier boundary, and maps the tier to a concrete
//! model through per-profile tier tables. No ML pipeline — pure
//! heuristics over keyword and pattern matching.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]

pub mod classifier;
mod cooldown;
mod error;
pub mod keywords;
mod profile;
pub mod selector;

pub use classifier::{Classification, ClassifierInput, classify};
pub use cooldown::CooldownTracker;
pub use error::RoutingError;
pub use keywords::KeywordSets;
pub use profile::RoutingProfile;
pub use selector::{RoutingDecision, RoutingMethod, fallback_chain, fallback_chain_filtered, select_model};
