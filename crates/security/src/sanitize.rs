//! Model output sanitization — keeps untrusted HTML inside its container.
//!
//! The host renderer already handles ordinary Markdown/HTML. This module only
//! blocks the known ways a response can escape the result container or run
//! code:
//!
//! - `position: fixed|absolute` (escaping container bounds)
//! - `z-index` (stacking over host UI)
//! - viewport units (overflowing the layout)
//! - `<iframe>`, `<embed>`, `<object>` (external content)
//! - `<script>` (code execution)
//! - `<style>` blocks and stylesheet links (global CSS)
//! - inline `on*=` handlers and `javascript:` links
//!
//! Rules run in a fixed order; removals come before the later rewrites so
//! nothing removed can be reintroduced. A new vector means a new rule here.

use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// A single rewrite rule.
struct Rule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("sanitizer pattern is valid"),
            replacement,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("position", r"(?i)position\s*:\s*(fixed|absolute)", "position: relative"),
        Rule::new("z-index", r"(?i)z-index\s*:\s*[^;]+;?", ""),
        Rule::new("viewport-units", r"(?i)\b\d+v[wh]\b", "100%"),
        Rule::new("iframe", r"(?is)<iframe[^>]*>.*?</iframe>", ""),
        Rule::new("embed", r"(?is)<embed[^>]*>.*?</embed>", ""),
        Rule::new("object", r"(?is)<object[^>]*>.*?</object>", ""),
        Rule::new("embedded-self-closing", r"(?i)<(iframe|embed|object)[^>]*/>", ""),
        Rule::new("script", r"(?is)<script[^>]*>.*?</script>", ""),
        Rule::new("script-self-closing", r"(?i)<script[^>]*/>", ""),
        Rule::new("style", r"(?is)<style[^>]*>.*?</style>", ""),
        Rule::new(
            "stylesheet-link",
            r#"(?i)<link[^>]*rel\s*=\s*["']stylesheet["'][^>]*>"#,
            "",
        ),
        Rule::new("event-handler", r#"(?i)\son\w+\s*=\s*["'][^"']*["']"#, ""),
        Rule::new("javascript-href", r#"(?i)href\s*=\s*["']javascript:"#, "href=\"#"),
    ]
});

/// Sanitize a model response. Must run before any other processing.
pub fn sanitize_content(text: &str) -> String {
    sanitize_with_report(text).0
}

/// Sanitize and report which rules changed the text.
pub fn sanitize_with_report(text: &str) -> (String, Vec<&'static str>) {
    let mut out = text.to_string();
    let mut fired = Vec::new();

    for rule in RULES.iter() {
        if rule.pattern.is_match(&out) {
            out = rule
                .pattern
                .replace_all(&out, rule.replacement)
                .into_owned();
            fired.push(rule.name);
        }
    }

    if !fired.is_empty() {
        debug!(rules = ?fired, "Sanitized model output");
    }

    (out, fired)
}
