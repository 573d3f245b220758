use http::StatusCode;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each subsystem's error type. The server layer turns
/// these into actual responses, so routing, payment, and cache errors
/// never need to depend on axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Stable machine-readable error type (e.g. `insufficient_funds`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
