//! Result history for one add-on across a chat.

use crate::store;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sidecar_core::ChatMessage;
use tracing::warn;

const PREVIEW_CHARS: usize = 50;

/// A decoded result found in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResult {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub message_index: usize,
    pub message_preview: String,
    pub edited: bool,
    pub addon_id: String,
}

/// Every stored result for `addon_id`, newest first.
///
/// Messages without a send date sort as if sent now. Markers that fail to
/// decode are logged and skipped.
pub fn get_all_results_for_addon(chat: &[ChatMessage], addon_id: &str) -> Vec<StoredResult> {
    let now = Utc::now();
    let mut results: Vec<StoredResult> = chat
        .iter()
        .enumerate()
        .filter(|(_, message)| !message.mes.is_empty())
        .filter_map(|(index, message)| {
            let content = match store::read_stored(&message.mes, addon_id) {
                Ok(Some(content)) if !content.is_empty() => content,
                Ok(_) => return None,
                Err(e) => {
                    warn!(addon_id, message_index = index, error = %e, "Failed to decode stored result");
                    return None;
                }
            };

            Some(StoredResult {
                content,
                timestamp: message.send_date.unwrap_or(now),
                message_id: message.key(index),
                message_index: index,
                message_preview: preview(&message.mes),
                edited: store::is_edited(&message.mes, addon_id),
                addon_id: addon_id.to_string(),
            })
        })
        .collect();

    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    results
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
