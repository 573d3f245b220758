//! Upstream payment-error transformation
//!
//! The aggregator reports payment problems as free-form error messages,
//! often with a nested "Verification failed" JSON payload embedded in the
//! message string. This module turns them into stable failure categories
//! the proxy can expose under well-known `type` identifiers.

use serde_json::Value;

/// Categorized payment failure extracted from an upstream error body
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentFailure {
    /// Wallet balance below the required amount
    InsufficientFunds {
        current_balance_usd: f64,
        required_usd: f64,
    },
    /// Signature rejected by the verifier
    InvalidPayload,
    /// On-chain settlement rejected
    SettlementFailed {
        /// Settlement ran out of gas (transient, worth a hint)
        out_of_gas: bool,
    },
}

/// Categorize an upstream error body as a payment failure, if it is one
pub fn transform_payment_error(body: &str) -> Option<PaymentFailure> {
    let message = extract_message(body);
    let lowered = message.to_lowercase();

    if lowered.contains("insufficient") && (lowered.contains("fund") || lowered.contains("balance")) {
        let (current, required) = extract_verification_amounts(&message);
        return Some(PaymentFailure::InsufficientFunds {
            current_balance_usd: current,
            required_usd: required,
        });
    }

    if lowered.contains("invalid signature") || lowered.contains("signature verification") {
        return Some(PaymentFailure::InvalidPayload);
    }

    if lowered.contains("settlement") {
        return Some(PaymentFailure::SettlementFailed {
            out_of_gas: lowered.contains("out of gas"),
        });
    }

    None
}

/// Pull the error message out of a JSON error body, or use the raw text
fn extract_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for path in [&["error", "message"][..], &["message"][..]] {
            let mut node = &json;
            let mut found = true;
            for key in path {
                match node.get(key) {
                    Some(next) => node = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found && let Some(s) = node.as_str() {
                return s.to_owned();
            }
        }
    }
    body.to_owned()
}

/// Parse balance numbers out of a nested "Verification failed" payload
///
/// The verifier embeds a JSON object after the "Verification failed:"
/// marker with `currentBalance`/`required` amounts in micro-USD.
fn extract_verification_amounts(message: &str) -> (f64, f64) {
    let Some(idx) = message.find("Verification failed") else {
        return (0.0, 0.0);
    };
    let rest = &message[idx..];
    let Some(start) = rest.find('{') else {
        return (0.0, 0.0);
    };

    let Some(object) = balanced_object(&rest[start..]) else {
        return (0.0, 0.0);
    };
    let Ok(json) = serde_json::from_str::<Value>(object) else {
        return (0.0, 0.0);
    };

    let current = micros_field(&json, &["currentBalance", "balance"]);
    let required = micros_field(&json, &["required", "requiredAmount", "amount"]);
    (current, required)
}

/// First balanced `{…}` prefix of the text
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a micro-USD field as USD, accepting number or string values
fn micros_field(json: &Value, keys: &[&str]) -> f64 {
    for key in keys {
        let value = match json.get(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse::<f64>().ok(),
            _ => None,
        };
        if let Some(micros) = value {
            return micros / 1_000_000.0;
        }
    }
    0.0
}
