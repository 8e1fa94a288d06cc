//! Display formatting of add-on results.

use regex_lite::Regex;
use sidecar_core::{Addon, ChatMessage, ResultFormat};
use sidecar_security::sanitize_content;
use std::sync::LazyLock;
use tracing::trace;

static OUTER_DETAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^<details[^>]*>(.*?)</details>$").expect("details pattern is valid")
});

/// Format a raw model response for display.
///
/// The response is always sanitized first. Panel output only loses one
/// redundant outer `<details>` wrapper (the panel draws its own); transcript
/// output is wrapped according to the add-on's [`ResultFormat`].
pub fn format_result(
    addon: &Addon,
    raw: &str,
    original_message: Option<&ChatMessage>,
    for_panel: bool,
) -> String {
    trace!(
        addon_id = %addon.id,
        speaker = original_message.map(|m| m.name.as_str()),
        for_panel,
        "Formatting result"
    );

    let sanitized = sanitize_content(raw);

    if for_panel {
        return strip_outer_details(&sanitized);
    }

    match addon.result_format {
        ResultFormat::Append => format!("\n\n{sanitized}"),
        ResultFormat::Separate => format!("\n\n--- {} ---\n{sanitized}\n---\n", addon.name),
        ResultFormat::Collapsible => format!(
            "\n\n<details>\n<summary><strong>{}</strong></summary>\n<div>\n{sanitized}\n</div>\n</details>",
            addon.name
        ),
    }
}

fn strip_outer_details(text: &str) -> String {
    let trimmed = text.trim();
    match OUTER_DETAILS.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addon(format: ResultFormat) -> Addon {
        Addon::new("summary", "Summary", "").with_format(format)
    }

    #[test]
    fn separate_format() {
        assert_eq!(
            format_result(&addon(ResultFormat::Separate), "Hello", None, false),
            "\n\n--- Summary ---\nHello\n---\n"
        );
    }

    #[test]
    fn append_format() {
        assert_eq!(
            format_result(&addon(ResultFormat::Append), "Hello", None, false),
            "\n\nHello"
        );
    }

    #[test]
    fn collapsible_is_default() {
        let out = format_result(&Addon::new("s", "Summary", ""), "Hello", None, false);
        assert_eq!(
            out,
            "\n\n<details>\n<summary><strong>Summary</strong></summary>\n<div>\nHello\n</div>\n</details>"
        );
    }

    #[test]
    fn sanitizes_before_formatting() {
        let out = format_result(
            &addon(ResultFormat::Append),
            "ok<script>alert(1)</script>",
            None,
            false,
        );
        assert_eq!(out, "\n\nok");
    }

    #[test]
    fn panel_strips_one_outer_details() {
        let raw = "  <details open><summary>S</summary>body</details>\n";
        let out = format_result(&addon(ResultFormat::Separate), raw, None, true);
        assert_eq!(out, "<summary>S</summary>body");
    }

    #[test]
    fn panel_keeps_partial_details() {
        let raw = "intro <details><summary>S</summary>x</details>";
        let out = format_result(&addon(ResultFormat::Collapsible), raw, None, true);
        assert_eq!(out, raw);
    }

    #[test]
    fn panel_trims_plain_text() {
        let out = format_result(&addon(ResultFormat::Append), "\n  plain  \n", None, true);
        assert_eq!(out, "plain");
    }
}
