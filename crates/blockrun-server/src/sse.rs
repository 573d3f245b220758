//! SSE transcoding of buffered completions
//!
//! The upstream is always called non-streaming; when the client asked
//! for `stream:true` the buffered JSON completion is re-emitted as
//! OpenAI-style SSE chunks: role delta, content delta, optional tool
//! calls, finish reason, `[DONE]`. Reasoning-token tags are stripped
//! from the content before emission.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde_json::Value;

/// The SSE heartbeat comment frame
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// The SSE terminator frame
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Matches `<think>…</think>` and sibling reasoning-token tags
fn think_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<(think|thinking|thought|reasoning)>.*?</(think|thinking|thought|reasoning)>\s*")
            .expect("must be valid regex")
    })
}

/// Strip reasoning-token tags from assistant content
pub fn strip_reasoning_tags(content: &str) -> String {
    think_tag_re().replace_all(content, "").into_owned()
}

/// Wrap a JSON chunk as one SSE frame
fn frame(chunk: &Value) -> String {
    format!("data: {chunk}\n\n")
}

/// Transcode a buffered chat completion into SSE frames
///
/// Returns the frames in emission order, terminator included. The
/// accumulated assistant text is returned alongside for session
/// bookkeeping.
pub fn completion_to_frames(completion: &Value, model: &str) -> (Vec<String>, String) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let id = completion
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| format!("chatcmpl-{now}"), str::to_owned);

    let message = completion
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"));

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(strip_reasoning_tags)
        .unwrap_or_default();
    let tool_calls = message.and_then(|m| m.get("tool_calls")).filter(|t| !t.is_null());
    let finish_reason = completion
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .unwrap_or("stop");

    let chunk = |delta: Value, finish: Option<&str>| {
        frame(&serde_json::json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": now,
            "model": model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish,
            }],
        }))
    };

    let mut frames = Vec::with_capacity(5);
    frames.push(chunk(serde_json::json!({"role": "assistant"}), None));
    if !content.is_empty() {
        frames.push(chunk(serde_json::json!({"content": content}), None));
    }
    if let Some(calls) = tool_calls {
        frames.push(chunk(serde_json::json!({"tool_calls": calls}), None));
    }
    frames.push(chunk(serde_json::json!({}), Some(finish_reason)));
    frames.push(DONE_FRAME.to_owned());

    (frames, content)
}

/// Error frame emitted when the failure happens after headers were sent
pub fn error_frame(body: &Value) -> String {
    frame(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop",
            }],
        })
    }

    #[test]
    fn frames_in_order_with_terminator() {
        let (frames, text) = completion_to_frames(&completion("hello"), "openai/gpt-4o-mini");
        assert_eq!(frames.len(), 4);
        assert!(frames[0].contains("\"role\":\"assistant\""));
        assert!(frames[1].contains("\"content\":\"hello\""));
        assert!(frames[2].contains("\"finish_reason\":\"stop\""));
        assert_eq!(frames[3], DONE_FRAME);
        assert_eq!(text, "hello");

        for frame in &frames[..3] {
            assert!(frame.starts_with("data: "));
            assert!(frame.ends_with("\n\n"));
        }
    }

    #[test]
    fn think_tags_are_stripped() {
        let (frames, text) = completion_to_frames(
            &completion("<think>let me ponder</think>The answer is 4."),
            "deepseek/deepseek-reasoner",
        );
        assert_eq!(text, "The answer is 4.");
        assert!(!frames[1].contains("ponder"));
    }

    #[test]
    fn tool_calls_get_their_own_frame() {
        let body = serde_json::json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{}"}}],
                },
                "finish_reason": "tool_calls",
            }],
        });
        let (frames, text) = completion_to_frames(&body, "openai/gpt-4o");
        assert!(text.is_empty());
        assert!(frames.iter().any(|f| f.contains("tool_calls")));
        assert!(frames.iter().any(|f| f.contains("\"finish_reason\":\"tool_calls\"")));
    }

    #[test]
    fn chunks_are_valid_json() {
        let (frames, _) = completion_to_frames(&completion("x"), "m");
        for frame in &frames[..frames.len() - 1] {
            let payload = frame.trim_start_matches("data: ").trim();
            let parsed: Value = serde_json::from_str(payload).unwrap();
            assert_eq!(parsed["object"], "chat.completion.chunk");
        }
    }
}
