//! Per-attempt request normalization
//!
//! Each fallback candidate sees a body adjusted for its provider's
//! quirks: role aliases mapped to canonical names, history truncated to
//! a tail window (system messages always survive), tool ids sanitized,
//! Google's first-message requirement satisfied, and reasoning models
//! given the `reasoning_content` stub they expect on tool-calling
//! assistant turns. The upstream is always called non-streaming.

use blockrun_core::ModelDescriptor;
use serde_json::{Map, Value};

/// Placeholder inserted when a Google model would otherwise see an
/// assistant message first
const CONTINUATION_PLACEHOLDER: &str = "(continuing conversation)";

/// Produce the body actually sent upstream for one candidate model
pub fn normalize_for_model(body: &Value, model: &ModelDescriptor, history_limit: usize) -> Value {
    let mut out = match body {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    out.insert("model".to_owned(), Value::String(model.id.clone()));
    // Upstream streaming is always disabled; the proxy re-streams itself
    out.insert("stream".to_owned(), Value::Bool(false));

    if let Some(Value::Array(messages)) = out.get("messages") {
        let mut messages: Vec<Value> = messages.iter().map(remap_roles).collect();
        messages = truncate_history(messages, history_limit);
        for message in &mut messages {
            sanitize_tool_ids(message);
        }
        if model.id.starts_with("google/") {
            insert_continuation_if_needed(&mut messages);
        }
        if model.reasoning {
            stub_reasoning_content(&mut messages);
        }
        out.insert("messages".to_owned(), Value::Array(messages));
    }

    Value::Object(out)
}

/// Map role aliases onto the canonical set
fn remap_roles(message: &Value) -> Value {
    let mut message = message.clone();
    if let Some(role) = message.get("role").and_then(Value::as_str) {
        let canonical = match role {
            "developer" => Some("system"),
            "function" => Some("tool"),
            _ => None,
        };
        if let Some(canonical) = canonical {
            message["role"] = Value::String(canonical.to_owned());
        }
    }
    message
}

/// Keep the last `limit` messages, never dropping system entries
fn truncate_history(messages: Vec<Value>, limit: usize) -> Vec<Value> {
    if messages.len() <= limit {
        return messages;
    }

    let system_count = messages.iter().filter(|m| role_of(m) == Some("system")).count();
    let tail_budget = limit.saturating_sub(system_count);
    let non_system_total = messages.len() - system_count;
    let skip_non_system = non_system_total.saturating_sub(tail_budget);

    let mut skipped = 0;
    let mut kept = Vec::with_capacity(limit);
    for message in messages {
        if role_of(&message) == Some("system") {
            kept.push(message);
        } else if skipped < skip_non_system {
            skipped += 1;
        } else {
            kept.push(message);
        }
    }
    kept
}

/// Replace characters outside `[A-Za-z0-9_-]` in tool call ids
fn sanitize_tool_ids(message: &mut Value) {
    if let Some(id) = message.get("tool_call_id").and_then(Value::as_str) {
        let clean = sanitize_id(id);
        message["tool_call_id"] = Value::String(clean);
    }

    if let Some(Value::Array(calls)) = message.get_mut("tool_calls") {
        for call in calls {
            if let Some(id) = call.get("id").and_then(Value::as_str) {
                let clean = sanitize_id(id);
                call["id"] = Value::String(clean);
            }
        }
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Google rejects conversations opening on an assistant turn
fn insert_continuation_if_needed(messages: &mut Vec<Value>) {
    let first_non_system = messages.iter().position(|m| role_of(m) != Some("system"));
    if let Some(idx) = first_non_system
        && matches!(role_of(&messages[idx]), Some("assistant" | "model"))
    {
        messages.insert(
            idx,
            serde_json::json!({"role": "user", "content": CONTINUATION_PLACEHOLDER}),
        );
    }
}

/// Reasoning models expect `reasoning_content` on tool-calling assistant turns
fn stub_reasoning_content(messages: &mut [Value]) {
    for message in messages {
        if role_of(message) == Some("assistant")
            && message.get("tool_calls").is_some_and(|c| !c.is_null())
            && message.get("reasoning_content").is_none()
        {
            message["reasoning_content"] = Value::String(String::new());
        }
    }
}

fn role_of(message: &Value) -> Option<&str> {
    message.get("role").and_then(Value::as_str)
}
