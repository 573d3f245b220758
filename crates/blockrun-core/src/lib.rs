//! Shared leaf types for the blockrun proxy
//!
//! Holds the pieces every other crate needs: the complexity [`Tier`]
//! ordering, the model registry with alias resolution, canonical JSON
//! used for request hashing, and the [`HttpError`] trait that keeps
//! domain errors decoupled from the HTTP layer.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod canon;
mod error;
pub mod model;
mod tier;
mod tokens;

pub use error::HttpError;
pub use model::{ModelDescriptor, ModelRegistry};
pub use tier::Tier;
pub use tokens::estimate_tokens;
