/// Estimate token count for a piece of text
///
/// Uses the bytes/4 heuristic. The routing semantics (force-complex
/// threshold, context-window filtering) are defined against this
/// estimate, so it must stay byte-based rather than switching to a BPE.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
