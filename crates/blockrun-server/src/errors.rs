//! Client-facing error taxonomy
//!
//! Every failure surfaces with a stable `type` identifier. Upstream
//! payment failures are transformed rather than relayed verbatim, and
//! provider failures keep the last HTTP status for debugging.

use axum::Json;
use axum::response::{IntoResponse, Response};
use blockrun_core::HttpError;
use blockrun_payment::{PaymentFailure, transform_payment_error};
use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the proxy core
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed request (bad JSON, missing messages, unknown model)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Wallet balance below the estimated cost
    #[error("insufficient funds: balance ${current_balance_usd:.4}, required ${required_usd:.4}")]
    InsufficientFunds {
        current_balance_usd: f64,
        required_usd: f64,
        wallet: String,
    },

    /// Signature rejected by the payment verifier
    #[error("payment signature rejected")]
    InvalidPayload,

    /// On-chain settlement rejected
    #[error("payment settlement failed")]
    SettlementFailed { out_of_gas: bool },

    /// Server-enforced spend limit hit
    #[error("budget exceeded")]
    BudgetExceeded,

    /// Upstream 429 that survived the fallback chain
    #[error("rate limited by upstream")]
    RateLimited,

    /// Mapped upstream provider failure
    #[error("provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    /// Fallback chain exhausted
    #[error("all providers unavailable")]
    AllProvidersUnavailable,

    /// Originator of a coalesced request failed
    #[error("original request failed")]
    DedupOriginFailed,

    /// Internal failure; request could not be processed
    #[error("proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Categorize a final upstream failure body into a client-facing error
    ///
    /// Payment failures become their stable types; anything else is a
    /// provider error carrying the last status.
    pub fn from_upstream(status: StatusCode, body: &[u8], wallet: &str) -> Self {
        let text = String::from_utf8_lossy(body);

        if let Some(failure) = transform_payment_error(&text) {
            return match failure {
                PaymentFailure::InsufficientFunds {
                    current_balance_usd,
                    required_usd,
                } => Self::InsufficientFunds {
                    current_balance_usd,
                    required_usd,
                    wallet: wallet.to_owned(),
                },
                PaymentFailure::InvalidPayload => Self::InvalidPayload,
                PaymentFailure::SettlementFailed { out_of_gas } => Self::SettlementFailed { out_of_gas },
            };
        }

        if text.to_lowercase().contains("budget") && text.to_lowercase().contains("exceed") {
            return Self::BudgetExceeded;
        }

        Self::Provider {
            status: status.as_u16(),
            message: truncate(&text, 400),
        }
    }

    /// JSON body for this error, including type-specific fields
    pub fn to_body(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.client_message(),
            "type": self.error_type(),
        });

        match self {
            Self::InsufficientFunds {
                current_balance_usd,
                required_usd,
                wallet,
            } => {
                error["current_balance_usd"] = serde_json::json!(current_balance_usd);
                error["required_usd"] = serde_json::json!(required_usd);
                error["wallet"] = serde_json::json!(wallet);
                error["help"] = serde_json::json!("top up the wallet, or request blockrun/free to continue without payment");
            }
            Self::SettlementFailed { out_of_gas: true } => {
                error["help"] = serde_json::json!("settlement ran out of gas; retrying usually succeeds");
            }
            Self::Provider { status, .. } => {
                error["upstream_status"] = serde_json::json!(status);
            }
            _ => {}
        }

        serde_json::json!({ "error": error })
    }
}

impl HttpError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds { .. } | Self::InvalidPayload | Self::BudgetExceeded => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::SettlementFailed { .. } | Self::Provider { .. } => StatusCode::BAD_GATEWAY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AllProvidersUnavailable | Self::DedupOriginFailed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::Internal(_) => "proxy_error",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidPayload => "invalid_payload",
            Self::SettlementFailed { .. } => "settlement_failed",
            Self::BudgetExceeded => "budget_exceeded",
            Self::RateLimited => "rate_limited",
            Self::Provider { .. } => "provider_error",
            Self::AllProvidersUnavailable => "all_providers_unavailable",
            Self::DedupOriginFailed => "dedup_origin_failed",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "request could not be processed".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_are_stable() {
        let cases: Vec<(ProxyError, &str, StatusCode)> = vec![
            (ProxyError::InvalidRequest("x".into()), "proxy_error", StatusCode::BAD_REQUEST),
            (
                ProxyError::InsufficientFunds {
                    current_balance_usd: 0.1,
                    required_usd: 1.0,
                    wallet: "0xabc".into(),
                },
                "insufficient_funds",
                StatusCode::PAYMENT_REQUIRED,
            ),
            (ProxyError::InvalidPayload, "invalid_payload", StatusCode::PAYMENT_REQUIRED),
            (
                ProxyError::SettlementFailed { out_of_gas: false },
                "settlement_failed",
                StatusCode::BAD_GATEWAY,
            ),
            (ProxyError::BudgetExceeded, "budget_exceeded", StatusCode::PAYMENT_REQUIRED),
            (ProxyError::RateLimited, "rate_limited", StatusCode::TOO_MANY_REQUESTS),
            (
                ProxyError::Provider {
                    status: 502,
                    message: "x".into(),
                },
                "provider_error",
                StatusCode::BAD_GATEWAY,
            ),
            (
                ProxyError::AllProvidersUnavailable,
                "all_providers_unavailable",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ProxyError::DedupOriginFailed, "dedup_origin_failed", StatusCode::SERVICE_UNAVAILABLE),
            (ProxyError::Internal("x".into()), "proxy_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected_type, expected_status) in cases {
            assert_eq!(error.error_type(), expected_type);
            assert_eq!(error.status_code(), expected_status);
        }
    }

    #[test]
    fn insufficient_funds_body_carries_details() {
        let error = ProxyError::InsufficientFunds {
            current_balance_usd: 0.25,
            required_usd: 1.5,
            wallet: "0xwallet".into(),
        };
        let body = error.to_body();
        assert_eq!(body["error"]["type"], "insufficient_funds");
        assert_eq!(body["error"]["wallet"], "0xwallet");
        assert!(body["error"]["help"].as_str().unwrap().contains("free"));
    }

    #[test]
    fn upstream_payment_errors_are_transformed() {
        let body = br#"{"error":{"message":"Verification failed: invalid signature"}}"#;
        let error = ProxyError::from_upstream(StatusCode::BAD_REQUEST, body, "0xw");
        assert!(matches!(error, ProxyError::InvalidPayload));

        let body = br#"{"error":{"message":"monthly budget exceeded"}}"#;
        let error = ProxyError::from_upstream(StatusCode::FORBIDDEN, body, "0xw");
        assert!(matches!(error, ProxyError::BudgetExceeded));

        let body = br#"{"error":{"message":"model fell over"}}"#;
        let error = ProxyError::from_upstream(StatusCode::BAD_GATEWAY, body, "0xw");
        match error {
            ProxyError::Provider { status, .. } => assert_eq!(status, 502),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn internal_details_stay_private() {
        let error = ProxyError::Internal("connection pool exploded at 0x7fff".into());
        assert_eq!(error.client_message(), "request could not be processed");
    }
}
