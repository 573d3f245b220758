//! Canonical JSON used for request hashing
//!
//! Dedup keys and cache keys must be stable across semantically identical
//! requests: key order is irrelevant, and agent frontends prepend a
//! wall-clock timestamp (`[Mon 2025-06-02 14:31 UTC] `) to message content
//! that would otherwise defeat every hash.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Matches the `[Www YYYY-MM-DD HH:MM TZ] ` prefix agent clients prepend
fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[\p{L}{2,4} \d{4}-\d{2}-\d{2} \d{2}:\d{2}(?::\d{2})? [^\]]{1,8}\] ")
            .expect("must be valid regex")
    })
}

/// Strip a leading timestamp prefix from message content, if present
pub fn strip_timestamp_prefix(text: &str) -> &str {
    match timestamp_re().find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Recursively canonicalize a JSON value
///
/// Object keys are sorted, and every string found under a `content` key
/// has its leading timestamp prefix removed. The result serializes to the
/// same bytes for any two semantically identical inputs.
pub fn canonicalize(value: &Value) -> Value {
    canonicalize_inner(value, false)
}

fn canonicalize_inner(value: &Value, in_content: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());

            let mut out = Map::new();
            for (key, val) in entries {
                let child_in_content = in_content || key == "content";
                out.insert(key.clone(), canonicalize_inner(val, child_in_content));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| canonicalize_inner(v, in_content)).collect()),
        Value::String(s) if in_content => Value::String(strip_timestamp_prefix(s).to_owned()),
        other => other.clone(),
    }
}

/// Canonical byte form of a request body
///
/// Parses as JSON when possible and serializes the canonicalized value;
/// falls back to the raw bytes for non-JSON bodies.
pub fn canonical_bytes(body: &[u8]) -> Vec<u8> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => serde_json::to_vec(&canonicalize(&value)).unwrap_or_else(|_| body.to_vec()),
        Err(_) => body.to_vec(),
    }
}
