use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// Supports an optional default via `{{ env.VAR | default("fallback") }}`.
/// Expansion happens on the raw text before deserialization so config
/// structs stay plain `String`/`SecretString`.
pub fn expand_env(input: &str) -> Result<String, String> {
    fn re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"\{\{\s*env\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
                .expect("must be valid regex")
        })
    }

    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for caps in re().captures_iter(input) {
        let whole = caps.get(0).expect("group 0 always present");
        let var = &caps[1];

        let value = match std::env::var(var) {
            Ok(v) => v,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_owned(),
                None => return Err(format!("environment variable `{var}` is not set")),
            },
        };

        output.push_str(&input[last..whole.start()]);
        output.push_str(&value);
        last = whole.end();
    }

    output.push_str(&input[last..]);
    Ok(output)
}
