//! Wire types of the x402 payment handshake
//!
//! The server announces requirements in a base64url-JSON
//! `x-payment-required` header; the client retries with a
//! standard-base64 signed envelope attached as both the
//! `payment-signature` and `x-payment` headers.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PaymentError;

/// Payment requirements decoded from `x-payment-required`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequired {
    /// Accepted payment options; the first is used
    pub accepts: Vec<PaymentOption>,
    /// Canonical resource being paid for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
}

/// Resource description attached to requirements and signed payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub url: String,
    pub description: String,
}

/// One accepted way to pay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    /// Payment scheme identifier (e.g. `exact`)
    pub scheme: String,
    /// Network identifier: CAIP `eip155:<chainId>`, or bare `base`/`base-sepolia`
    pub network: String,
    /// Asset contract address
    pub asset: String,
    /// Payee address
    pub pay_to: String,
    /// Amount in the asset's smallest denomination, as a decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Legacy key for the same amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount_required: Option<String>,
    /// Authorization validity window in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// EIP-712 domain overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<DomainExtra>,
}

impl PaymentOption {
    /// The amount, preferring `amount` over `maxAmountRequired`
    pub fn required_amount(&self) -> Result<&str, PaymentError> {
        self.amount
            .as_deref()
            .or(self.max_amount_required.as_deref())
            .ok_or(PaymentError::MissingAmount)
    }
}

/// Optional EIP-712 domain name/version carried in an option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Signed payment envelope attached to the retried request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayment {
    pub x402_version: u32,
    pub resource: SignedResource,
    pub accepted: PaymentOption,
    pub payload: SignedPayload,
    pub extensions: serde_json::Map<String, Value>,
}

/// Resource block of the signed envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedResource {
    pub url: String,
    pub description: String,
    pub mime_type: String,
}

/// Signature plus the authorization it covers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPayload {
    pub signature: String,
    pub authorization: AuthorizationFields,
}

/// EIP-712 `TransferWithAuthorization` fields as wire strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFields {
    pub from: String,
    pub to: String,
    /// Decimal string, smallest denomination
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    /// 32 random bytes as `0x`-prefixed hex
    pub nonce: String,
}

/// Decode an `x-payment-required` header value
///
/// Tolerates both base64url alphabets and optional `=` padding.
pub fn decode_payment_required(header: &str) -> Result<PaymentRequired, PaymentError> {
    let trimmed = header.trim().trim_end_matches('=');
    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| PaymentError::Decode(format!("x-payment-required is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| PaymentError::Decode(format!("x-payment-required is not valid JSON: {e}")))
}

/// Encode payment requirements the way the upstream does (base64url, no padding)
pub fn encode_payment_required(required: &PaymentRequired) -> String {
    let json = serde_json::to_vec(required).expect("payment requirements serialize");
    URL_SAFE_NO_PAD.encode(json)
}

/// Encode a signed envelope for the `payment-signature`/`x-payment` headers
pub fn encode_signed_payment(payment: &SignedPayment) -> String {
    let json = serde_json::to_vec(payment).expect("signed payment serializes");
    STANDARD.encode(json)
}

/// Decode a signed envelope (used by tests and the mock upstream)
pub fn decode_signed_payment(header: &str) -> Result<SignedPayment, PaymentError> {
    let bytes = STANDARD
        .decode(header.trim().as_bytes())
        .map_err(|e| PaymentError::Decode(format!("payment header is not base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| PaymentError::Decode(format!("payment header is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PaymentRequired {
        PaymentRequired {
            accepts: vec![PaymentOption {
                scheme: "exact".to_owned(),
                network: "eip155:8453".to_owned(),
                asset: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_owned(),
                pay_to: "0x1111111111111111111111111111111111111111".to_owned(),
                amount: Some("1500".to_owned()),
                max_amount_required: None,
                max_timeout_seconds: Some(120),
                extra: None,
            }],
            resource: Some(ResourceInfo {
                url: "https://gateway.blockrun.ai/v1/chat/completions".to_owned(),
                description: "chat completion".to_owned(),
            }),
        }
    }

    #[test]
    fn requirements_round_trip() {
        let encoded = encode_payment_required(&sample());
        let decoded = decode_payment_required(&encoded).unwrap();
        assert_eq!(decoded.accepts[0].pay_to, sample().accepts[0].pay_to);
        assert_eq!(decoded.accepts[0].required_amount().unwrap(), "1500");
    }

    #[test]
    fn decode_tolerates_padding_and_alphabets() {
        let encoded = encode_payment_required(&sample());
        // Trailing padding
        let padded = format!("{encoded}==");
        assert!(decode_payment_required(&padded).is_ok());
        // Standard alphabet variant
        let standard: String = encoded
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                other => other,
            })
            .collect();
        assert!(decode_payment_required(&standard).is_ok());
    }

    #[test]
    fn amount_falls_back_to_max_amount_required() {
        let mut option = sample().accepts[0].clone();
        option.amount = None;
        option.max_amount_required = Some("9000".to_owned());
        assert_eq!(option.required_amount().unwrap(), "9000");

        option.max_amount_required = None;
        assert!(matches!(option.required_amount(), Err(PaymentError::MissingAmount)));
    }

    #[test]
    fn signed_envelope_uses_wire_key_names() {
        let payment = SignedPayment {
            x402_version: 2,
            resource: SignedResource {
                url: "https://example.com".to_owned(),
                description: "d".to_owned(),
                mime_type: "application/json".to_owned(),
            },
            accepted: sample().accepts[0].clone(),
            payload: SignedPayload {
                signature: "0xabc".to_owned(),
                authorization: AuthorizationFields {
                    from: "0x1".to_owned(),
                    to: "0x2".to_owned(),
                    value: "1500".to_owned(),
                    valid_after: "0".to_owned(),
                    valid_before: "600".to_owned(),
                    nonce: "0x00".to_owned(),
                },
            },
            extensions: serde_json::Map::new(),
        };

        let json = serde_json::to_value(&payment).unwrap();
        assert_eq!(json["x402Version"], 2);
        assert_eq!(json["resource"]["mimeType"], "application/json");
        assert_eq!(json["payload"]["authorization"]["validAfter"], "0");
        assert_eq!(json["accepted"]["payTo"], sample().accepts[0].pay_to);
    }
}
