//! Transcript-embedded result store.
//!
//! Raw add-on results live inside a message's own text as HTML comments, so
//! they travel with the chat file and survive reloads:
//!
//! ```text
//! <!-- sidecar-storage:{addonId}:{base64(utf8(raw))} -->
//! <!-- sidecar-edited:{addonId} -->
//! <!-- addon-result:{addonId} -->{html}<!-- /addon-result:{addonId} -->
//! <!-- sidecar-fallback:{addonId}:{unixMillis} -->
//! ```
//!
//! Everything here is a pure function over message text. At most one storage
//! marker exists per (message, add-on); writes replace it in place, so edits
//! to different add-ons' markers on the same message commute.

use crate::format::format_result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use sidecar_core::error::StorageError;
use sidecar_core::{Addon, ChatMessage, ResponseLocation};
use std::ops::Range;
use tracing::{debug, error, info, warn};

const STORAGE_OPEN: &str = "<!-- sidecar-storage:";
const COMMENT_CLOSE: &str = " -->";

// ── Marker syntax ──

pub fn storage_marker(addon_id: &str, encoded: &str) -> String {
    format!("{STORAGE_OPEN}{addon_id}:{encoded}{COMMENT_CLOSE}")
}

pub fn edited_marker(addon_id: &str) -> String {
    format!("<!-- sidecar-edited:{addon_id} -->")
}

pub fn fallback_marker(addon_id: &str, unix_millis: i64) -> String {
    format!("<!-- sidecar-fallback:{addon_id}:{unix_millis} -->")
}

/// Opening tag of a visible result block.
pub fn result_tag(addon_id: &str) -> String {
    format!("<!-- addon-result:{addon_id} -->")
}

fn result_close_tag(addon_id: &str) -> String {
    format!("<!-- /addon-result:{addon_id} -->")
}

pub fn result_block(addon_id: &str, html: &str) -> String {
    format!("{}{html}{}", result_tag(addon_id), result_close_tag(addon_id))
}

// ── Codec ──

/// Base64-encode a raw result's UTF-8 bytes for `addon_id`'s marker.
///
/// Fails when the id would make the marker ambiguous: a `:` shifts the
/// payload boundary and a `-->` ends the comment early.
pub fn encode_result(addon_id: &str, raw: &str) -> Result<String, StorageError> {
    if addon_id.contains(':') || addon_id.contains("-->") {
        return Err(StorageError::UnembeddableAddonId {
            addon_id: addon_id.to_string(),
        });
    }
    Ok(STANDARD.encode(raw.as_bytes()))
}

pub fn decode_result(addon_id: &str, encoded: &str) -> Result<String, StorageError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| StorageError::InvalidEncoding {
            addon_id: addon_id.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| StorageError::InvalidUtf8 {
        addon_id: addon_id.to_string(),
    })
}

// ── Storage markers ──

/// Locate the first storage marker for `addon_id` at or after `from`.
/// Returns the marker's byte range and its payload's byte range.
fn find_storage(text: &str, addon_id: &str, from: usize) -> Option<(Range<usize>, Range<usize>)> {
    let prefix = format!("{STORAGE_OPEN}{addon_id}:");
    let start = from + text.get(from..)?.find(&prefix)?;
    let payload_start = start + prefix.len();
    let payload_len = text[payload_start..].find(COMMENT_CLOSE)?;
    if payload_len == 0 {
        return None;
    }
    let payload_end = payload_start + payload_len;
    Some((start..payload_end + COMMENT_CLOSE.len(), payload_start..payload_end))
}

/// Decode the stored result for `addon_id`, if any.
pub fn read_stored(text: &str, addon_id: &str) -> Result<Option<String>, StorageError> {
    match find_storage(text, addon_id, 0) {
        Some((_, payload)) => decode_result(addon_id, &text[payload]).map(Some),
        None => Ok(None),
    }
}

/// Write an already-encoded payload, replacing the first marker in place and
/// dropping any duplicates after it. Returns `true` if a marker was appended.
fn put_encoded(text: &mut String, addon_id: &str, encoded: &str) -> bool {
    let marker = storage_marker(addon_id, encoded);

    let Some((range, _)) = find_storage(text, addon_id, 0) else {
        text.push('\n');
        text.push_str(&marker);
        return true;
    };

    text.replace_range(range.clone(), &marker);
    let after = range.start + marker.len();
    while let Some((dup, _)) = find_storage(text, addon_id, after) {
        let start = if text[..dup.start].ends_with('\n') && dup.start > after {
            dup.start - 1
        } else {
            dup.start
        };
        text.replace_range(start..dup.end, "");
    }
    false
}

/// Store `raw` for `addon_id`.
pub fn write_stored(text: &mut String, addon_id: &str, raw: &str) -> Result<(), StorageError> {
    let encoded = encode_result(addon_id, raw)?;
    put_encoded(text, addon_id, &encoded);
    Ok(())
}

/// Remove every storage marker for `addon_id`, each with its leading newline.
pub fn remove_stored(text: &mut String, addon_id: &str) -> bool {
    let mut removed = false;
    while let Some((range, _)) = find_storage(text, addon_id, 0) {
        let start = if text[..range.start].ends_with('\n') {
            range.start - 1
        } else {
            range.start
        };
        text.replace_range(start..range.end, "");
        removed = true;
    }
    removed
}

/// Ids of every add-on with a storage marker, in order of appearance.
pub fn stored_addon_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(STORAGE_OPEN) {
        let body_start = start + STORAGE_OPEN.len();
        let Some(body_len) = rest[body_start..].find(COMMENT_CLOSE) else {
            break;
        };
        let body = &rest[body_start..body_start + body_len];
        if let Some((id, payload)) = body.rsplit_once(':')
            && !id.is_empty()
            && !payload.is_empty()
            && !ids.iter().any(|known| known == id)
        {
            ids.push(id.to_string());
        }
        rest = &rest[body_start + body_len..];
    }
    ids
}

// ── Edited flag ──

pub fn is_edited(text: &str, addon_id: &str) -> bool {
    text.contains(&edited_marker(addon_id))
}

/// Append the edited marker once. Returns `true` if it was added.
pub fn mark_edited(text: &mut String, addon_id: &str) -> bool {
    if is_edited(text, addon_id) {
        return false;
    }
    text.push('\n');
    text.push_str(&edited_marker(addon_id));
    true
}

pub fn remove_edited(text: &mut String, addon_id: &str) -> bool {
    let marker = edited_marker(addon_id);
    if !text.contains(&marker) {
        return false;
    }
    *text = text.replace(&format!("\n{marker}"), "").replace(&marker, "");
    true
}

// ── Visible result blocks ──

fn find_result_block(text: &str, addon_id: &str) -> Option<Range<usize>> {
    let open = result_tag(addon_id);
    let close = result_close_tag(addon_id);
    let start = text.find(&open)?;
    let close_at = text[start + open.len()..].find(&close)?;
    Some(start..start + open.len() + close_at + close.len())
}

pub fn has_result_block(text: &str, addon_id: &str) -> bool {
    find_result_block(text, addon_id).is_some()
}

/// Replace the first result block for `addon_id`, or append one.
pub fn upsert_result_block(text: &mut String, addon_id: &str, html: &str) {
    let block = result_block(addon_id, html);
    match find_result_block(text, addon_id) {
        Some(range) => text.replace_range(range, &block),
        None => text.push_str(&block),
    }
}

pub fn remove_result_block(text: &mut String, addon_id: &str) -> bool {
    let mut removed = false;
    while let Some(range) = find_result_block(text, addon_id) {
        text.replace_range(range, "");
        removed = true;
    }
    removed
}

// ── Message-level operations ──

/// Persist a raw result into the message text.
///
/// Returns `false` when there is nothing to store or encoding fails; in the
/// latter case a fallback marker records that a result existed.
pub fn save_result_to_metadata(message: &mut ChatMessage, addon: &Addon, raw: &str) -> bool {
    if addon.id.is_empty() || raw.is_empty() {
        warn!(addon_id = %addon.id, "Cannot save result: missing add-on id or content");
        return false;
    }

    match encode_result(&addon.id, raw) {
        Ok(encoded) => {
            match decode_result(&addon.id, &encoded) {
                Ok(decoded) if decoded == raw => {}
                Ok(_) => warn!(addon_id = %addon.id, "Encoding verification mismatch, continuing"),
                Err(e) => warn!(addon_id = %addon.id, error = %e, "Encoding verification failed, continuing"),
            }

            if put_encoded(&mut message.mes, &addon.id, &encoded) {
                info!(addon = %addon.name, chars = raw.chars().count(), "Saved result metadata");
            } else {
                debug!(addon = %addon.name, "Updated result metadata");
            }
            true
        }
        Err(e) => {
            error!(addon_id = %addon.id, addon = %addon.name, error = %e, "Failed to encode result");
            message.mes.push('\n');
            message
                .mes
                .push_str(&fallback_marker(&addon.id, Utc::now().timestamp_millis()));
            false
        }
    }
}

/// Replace a stored result with user-edited content and flag it edited.
///
/// For `chatHistory` add-ons the visible result block is rewritten too.
pub fn update_result_in_metadata(
    message: &mut ChatMessage,
    addon_id: &str,
    new_content: &str,
    addon: Option<&Addon>,
) -> bool {
    if addon_id.is_empty() || new_content.is_empty() || message.mes.is_empty() {
        return false;
    }

    if let Err(e) = write_stored(&mut message.mes, addon_id, new_content) {
        error!(addon_id, error = %e, "Failed to encode edited result");
        return false;
    }
    mark_edited(&mut message.mes, addon_id);

    if let Some(addon) = addon.filter(|a| a.response_location == ResponseLocation::ChatHistory) {
        let formatted = format_result(addon, new_content, Some(&*message), false);
        upsert_result_block(&mut message.mes, addon_id, &formatted);
    }

    true
}

/// Remove an add-on's storage marker, result block and edited flag.
pub fn delete_result_from_metadata(message: &mut ChatMessage, addon_id: &str) -> bool {
    if addon_id.is_empty() || message.mes.is_empty() {
        return false;
    }

    let stored = remove_stored(&mut message.mes, addon_id);
    let block = remove_result_block(&mut message.mes, addon_id);
    let edited = remove_edited(&mut message.mes, addon_id);
    stored || block || edited
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_core::ResultFormat;

    fn count(text: &str, needle: &str) -> usize {
        text.matches(needle).count()
    }

    #[test]
    fn codec_round_trips_multibyte_text() {
        for raw in ["plain", "émoji 🎉 and 日本語", "<b>html</b> & \"quotes\"", "line\nbreaks"] {
            let encoded = encode_result("a", raw).unwrap();
            assert!(!encoded.contains("-->"));
            assert_eq!(decode_result("a", &encoded).unwrap(), raw);
        }
    }

    #[test]
    fn decode_rejects_bad_payloads() {
        assert!(matches!(
            decode_result("a", "not base64!"),
            Err(StorageError::InvalidEncoding { .. })
        ));
        let invalid_utf8 = STANDARD.encode([0xff, 0xfe]);
        assert!(matches!(
            decode_result("a", &invalid_utf8),
            Err(StorageError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn marker_wire_format() {
        let mut text = String::from("Hello");
        write_stored(&mut text, "summary", "Hi").unwrap();
        assert_eq!(text, "Hello\n<!-- sidecar-storage:summary:SGk= -->");
        assert_eq!(read_stored(&text, "summary").unwrap().as_deref(), Some("Hi"));
        assert_eq!(read_stored(&text, "other").unwrap(), None);
    }

    #[test]
    fn write_replaces_in_place() {
        let mut text = String::from("Hello");
        write_stored(&mut text, "a", "one").unwrap();
        write_stored(&mut text, "b", "two").unwrap();
        write_stored(&mut text, "a", "three").unwrap();

        assert_eq!(count(&text, "sidecar-storage:a:"), 1);
        assert_eq!(read_stored(&text, "a").unwrap().as_deref(), Some("three"));
        assert_eq!(read_stored(&text, "b").unwrap().as_deref(), Some("two"));
        assert!(text.find("sidecar-storage:a:") < text.find("sidecar-storage:b:"));
    }

    #[test]
    fn write_collapses_duplicates() {
        let mut text = format!(
            "x\n{}\n{}",
            storage_marker("a", "b2xk"),
            storage_marker("a", "b2xkZXI=")
        );
        write_stored(&mut text, "a", "new").unwrap();
        assert_eq!(count(&text, "sidecar-storage:a:"), 1);
        assert_eq!(text, format!("x\n{}", storage_marker("a", "bmV3")));
    }

    #[test]
    fn ids_sharing_a_prefix_stay_separate() {
        let mut text = String::new();
        write_stored(&mut text, "sum", "short").unwrap();
        write_stored(&mut text, "summary", "long").unwrap();
        assert_eq!(read_stored(&text, "sum").unwrap().as_deref(), Some("short"));
        assert_eq!(read_stored(&text, "summary").unwrap().as_deref(), Some("long"));
        assert_eq!(stored_addon_ids(&text), vec!["sum", "summary"]);
    }

    #[test]
    fn edited_flag() {
        let mut text = String::from("m");
        assert!(!is_edited(&text, "a"));
        assert!(mark_edited(&mut text, "a"));
        assert!(!mark_edited(&mut text, "a"));
        assert_eq!(text, "m\n<!-- sidecar-edited:a -->");
        assert!(remove_edited(&mut text, "a"));
        assert_eq!(text, "m");
        assert!(!remove_edited(&mut text, "a"));
    }

    #[test]
    fn result_blocks() {
        let mut text = String::from("reply");
        assert!(!has_result_block(&text, "a"));
        upsert_result_block(&mut text, "a", "<p>one</p>");
        upsert_result_block(&mut text, "a", "<p>two</p>");
        assert_eq!(
            text,
            "reply<!-- addon-result:a --><p>two</p><!-- /addon-result:a -->"
        );
        assert!(has_result_block(&text, "a"));
        assert!(remove_result_block(&mut text, "a"));
        assert_eq!(text, "reply");
    }

    #[test]
    fn save_twice_leaves_one_marker() {
        let addon = Addon::new("summary", "Summary", "");
        let mut message = ChatMessage::character("Bot", "Hello there");
        assert!(save_result_to_metadata(&mut message, &addon, "Result"));
        assert!(save_result_to_metadata(&mut message, &addon, "Result"));
        assert_eq!(count(&message.mes, "sidecar-storage:summary:"), 1);
        assert!(message.mes.starts_with("Hello there\n<!-- sidecar-storage:summary:"));
    }

    #[test]
    fn save_rejects_empty_input() {
        let mut message = ChatMessage::character("Bot", "Hello");
        assert!(!save_result_to_metadata(&mut message, &Addon::new("", "X", ""), "r"));
        assert!(!save_result_to_metadata(&mut message, &Addon::new("a", "A", ""), ""));
        assert_eq!(message.mes, "Hello");
    }

    #[test]
    fn large_results_are_stored_in_full() {
        let addon = Addon::new("big", "Big", "");
        let mut message = ChatMessage::character("Bot", "Hello");
        let raw = "x".repeat(150_000);
        assert!(save_result_to_metadata(&mut message, &addon, &raw));
        assert_eq!(read_stored(&message.mes, "big").unwrap().as_deref(), Some(raw.as_str()));
        assert!(!message.mes.contains("sidecar-fallback"));
    }

    #[test]
    fn unembeddable_addon_id_writes_fallback_marker() {
        let addon = Addon::new("a:b", "Colon", "");
        let mut message = ChatMessage::character("Bot", "Hello");
        assert!(!save_result_to_metadata(&mut message, &addon, "result"));
        assert!(message.mes.contains("<!-- sidecar-fallback:a:b:"));
        assert!(!message.mes.contains("sidecar-storage"));

        let mut text = String::from("Hello");
        assert!(matches!(
            write_stored(&mut text, "x -->", "r"),
            Err(StorageError::UnembeddableAddonId { .. })
        ));
        assert_eq!(text, "Hello");
    }

    #[test]
    fn update_marks_edited_once_and_rewrites_block() {
        let addon = Addon::new("s", "Summary", "")
            .with_format(ResultFormat::Separate)
            .with_location(ResponseLocation::ChatHistory);
        let mut message = ChatMessage::character("Bot", "Hello");
        save_result_to_metadata(&mut message, &addon, "old");
        upsert_result_block(
            &mut message.mes,
            "s",
            &format_result(&addon, "old", None, false),
        );

        assert!(update_result_in_metadata(&mut message, "s", "new", Some(&addon)));
        assert!(update_result_in_metadata(&mut message, "s", "newer", Some(&addon)));

        assert_eq!(read_stored(&message.mes, "s").unwrap().as_deref(), Some("newer"));
        assert_eq!(count(&message.mes, "sidecar-edited:s"), 1);
        assert_eq!(count(&message.mes, "<!-- addon-result:s -->"), 1);
        assert!(message.mes.contains("--- Summary ---\nnewer\n---"));
        assert!(!update_result_in_metadata(&mut message, "s", "", Some(&addon)));
    }

    #[test]
    fn update_for_panel_addon_leaves_no_block() {
        let addon = Addon::new("p", "Panel", "");
        let mut message = ChatMessage::character("Bot", "Hello");
        assert!(update_result_in_metadata(&mut message, "p", "edited", Some(&addon)));
        assert!(!has_result_block(&message.mes, "p"));
        assert!(is_edited(&message.mes, "p"));
    }

    #[test]
    fn delete_removes_everything_for_addon_only() {
        let a = Addon::new("a", "A", "").with_location(ResponseLocation::ChatHistory);
        let b = Addon::new("b", "B", "");
        let mut message = ChatMessage::character("Bot", "Hello");
        save_result_to_metadata(&mut message, &a, "ra");
        save_result_to_metadata(&mut message, &b, "rb");
        update_result_in_metadata(&mut message, "a", "ra2", Some(&a));

        assert!(delete_result_from_metadata(&mut message, "a"));
        assert!(!message.mes.contains(":a"));
        assert!(!message.mes.contains("addon-result:a"));
        assert_eq!(read_stored(&message.mes, "b").unwrap().as_deref(), Some("rb"));
        assert!(!delete_result_from_metadata(&mut message, "a"));
    }
}
