//! Re-deriving the document projection from transcript markers after a load.

use crate::dom::Dom;
use crate::format::format_result;
use crate::locator::content_area;
use crate::present::{ResultFormatter, append_result_block, render_panel, resolve_message};
use crate::store;
use sidecar_core::{Addon, ResponseLocation, SharedChat};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many leading characters of a result count as "already visible".
const VISIBLE_PREFIX_CHARS: usize = 50;

impl<D: Dom> ResultFormatter<D> {
    /// Restore every stored result of an enabled add-on into the document.
    ///
    /// Waits `restore_settle_ms` for the host to finish rendering, then walks
    /// the AI messages. Results already visible are skipped, so running this
    /// twice restores nothing the second time. Returns the number restored.
    pub async fn restore_blocks_from_metadata(&self, chat: &SharedChat, addons: &[Addon]) -> usize {
        let snapshot = chat.read().await.clone();
        if snapshot.is_empty() {
            debug!("No chat loaded, skipping restoration");
            return 0;
        }

        let enabled: Vec<&Addon> = addons.iter().filter(|a| a.enabled).collect();
        tokio::time::sleep(Duration::from_millis(self.ui().restore_settle_ms)).await;

        let dom = self.dom();
        let mut dom = dom.lock().await;
        let mut restored = 0;

        for (index, message) in snapshot.iter().enumerate() {
            if message.is_user || message.mes.is_empty() {
                continue;
            }
            let key = message.key(index);

            for addon in &enabled {
                let decoded = match store::read_stored(&message.mes, &addon.id) {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(addon = %addon.name, message_key = %key, error = %e, "Failed to restore result");
                        continue;
                    }
                };

                let length = decoded.chars().count();
                if length == 0 || length >= self.ui().max_restore_len {
                    debug!(addon_id = %addon.id, length, "Stored result outside restorable size");
                    continue;
                }

                let Some(element) = resolve_message(&*dom, &snapshot, index) else {
                    debug!(message_key = %key, "No element for message, skipping");
                    continue;
                };

                match addon.response_location {
                    ResponseLocation::ChatHistory => {
                        let area = content_area(&*dom, element);
                        let html = dom.inner_html(area);
                        let prefix: String = decoded.chars().take(VISIBLE_PREFIX_CHARS).collect();
                        if html.contains(&store::result_tag(&addon.id)) || html.contains(&prefix) {
                            continue;
                        }
                        let formatted = format_result(addon, &decoded, Some(message), false);
                        append_result_block(&mut *dom, element, &addon.id, &formatted);
                    }
                    ResponseLocation::OutsideChatlog => {
                        if dom.has_descendant_with_class(element, &format!("addon_section-{}", addon.id)) {
                            continue;
                        }
                        let formatted = format_result(addon, &decoded, Some(message), true);
                        render_panel(&mut *dom, element, &key, addon, &formatted, "Generated at");
                    }
                }

                restored += 1;
                debug!(addon = %addon.name, message_key = %key, "Restored result");
            }
        }

        info!(restored, "Restored results from transcript");
        restored
    }
}
