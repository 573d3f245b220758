//! Loss-tolerant context compression
//!
//! Applied once per request when the serialized body crosses the
//! configured threshold. Three layers, all safe to apply blindly:
//! duplicate messages are dropped, whitespace runs are collapsed, and
//! JSON-looking tool results are re-serialized compactly.

use std::collections::HashSet;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compress the message history in place when the body is large enough
///
/// Returns whether anything was rewritten.
pub fn compress_if_large(body: &mut Value, threshold_bytes: usize) -> bool {
    let size = serde_json::to_vec(&*body).map(|b| b.len()).unwrap_or(0);
    if size < threshold_bytes {
        return false;
    }

    let Some(Value::Array(messages)) = body.get_mut("messages") else {
        return false;
    };

    let before = messages.len();
    dedup_messages(messages);
    for message in messages.iter_mut() {
        normalize_whitespace(message);
        compact_tool_json(message);
    }

    tracing::debug!(
        before_bytes = size,
        dropped_messages = before - messages.len(),
        "compressed oversized context"
    );
    true
}

/// Drop exact duplicate messages, keeping the first occurrence
fn dedup_messages(messages: &mut Vec<Value>) {
    let mut seen = HashSet::new();
    messages.retain(|message| {
        let bytes = serde_json::to_vec(message).unwrap_or_default();
        let hash: [u8; 32] = Sha256::digest(&bytes).into();
        seen.insert(hash)
    });
}

/// Collapse horizontal whitespace runs and excess blank lines in content
fn normalize_whitespace(message: &mut Value) {
    let Some(content) = message.get("content").and_then(Value::as_str) else {
        return;
    };

    let mut out = String::with_capacity(content.len());
    let mut blank_lines = 0usize;
    for line in content.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_lines += 1;
            if blank_lines > 1 {
                continue;
            }
        } else {
            blank_lines = 0;
        }
        let mut last_was_space = false;
        for c in trimmed.chars() {
            if c == ' ' || c == '\t' {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(c);
                last_was_space = false;
            }
        }
        out.push('\n');
    }
    if out.ends_with('\n') && !content.ends_with('\n') {
        out.pop();
    }

    if out != content {
        message["content"] = Value::String(out);
    }
}

/// Re-serialize JSON-looking tool results without pretty-printing
fn compact_tool_json(message: &mut Value) {
    if message.get("role").and_then(Value::as_str) != Some("tool") {
        return;
    }
    let Some(content) = message.get("content").and_then(Value::as_str) else {
        return;
    };
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed)
        && let Ok(compact) = serde_json::to_string(&parsed)
        && compact.len() < content.len()
    {
        message["content"] = Value::String(compact);
    }
}
