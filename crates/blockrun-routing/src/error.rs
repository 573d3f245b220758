use thiserror::Error;

/// Errors that can occur during model selection
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A tier table references a model missing from the registry
    #[error("model not in registry: {model}")]
    UnknownModel { model: String },
}
