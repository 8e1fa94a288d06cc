//! DOM projection of add-on results.
//!
//! The transcript markers are the source of truth; everything drawn here can
//! be thrown away and re-derived. Each entry point locks the document, resolves
//! its anchors fresh (or from the short-lived cache), mutates, and releases
//! the lock before any delay. Failures are logged and reported as `false` or
//! `None`; nothing here is fatal to the host.

use crate::dom::{Dom, NodeId};
use crate::format::format_result;
use crate::locator::{
    MessageCache, content_area, element_key, find_message_element,
    find_message_element_by_index, find_message_element_or_latest,
};
use crate::store;
use chrono::Local;
use sidecar_config::UiConfig;
use sidecar_core::{Addon, ChatMessage, HostContext, SharedChat, position_of_key};
use sidecar_security::escape_html;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Where a Retry button sends the user back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTarget {
    pub addon_id: String,
    pub message_key: String,
}

/// An open edit-in-place session for one result slot.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub addon_id: String,
    pub message_key: String,
    slot: NodeId,
    textarea: NodeId,
    original_html: String,
}

impl EditSession {
    /// The textarea holding the user's edit.
    pub fn textarea(&self) -> NodeId {
        self.textarea
    }
}

/// Presents results in a document and keeps them in sync with the transcript.
pub struct ResultFormatter<D: Dom> {
    dom: Arc<Mutex<D>>,
    ui: UiConfig,
    cache: Mutex<MessageCache>,
}

impl<D: Dom> ResultFormatter<D> {
    pub fn new(dom: Arc<Mutex<D>>, ui: UiConfig) -> Self {
        let cache = MessageCache::new(Duration::from_millis(ui.cache_ttl_ms));
        Self {
            dom,
            ui,
            cache: Mutex::new(cache),
        }
    }

    pub fn dom(&self) -> Arc<Mutex<D>> {
        Arc::clone(&self.dom)
    }

    pub fn ui(&self) -> &UiConfig {
        &self.ui
    }

    /// Forget the cached latest AI message. Call when new messages arrive.
    pub async fn invalidate_cache(&self) {
        self.cache.lock().await.invalidate();
    }

    async fn latest_ai(&self, dom: &D) -> Option<NodeId> {
        self.cache.lock().await.latest_ai_message(dom)
    }

    // ── Result injection ──

    /// Put a delimited result block into the message's rendered content.
    ///
    /// A block already rendered for the add-on is replaced, so re-running an
    /// add-on on the same message leaves one block.
    pub async fn inject_into_chat_history(
        &self,
        message_key: &str,
        addon: &Addon,
        formatted: &str,
    ) -> bool {
        let mut dom = self.dom.lock().await;
        let Some(element) = find_message_element_or_latest(&*dom, message_key) else {
            warn!(message_key, addon_id = %addon.id, "Message element not found for chat history injection");
            return false;
        };

        let area = content_area(&*dom, element);
        let replaced = dom.edit_markup(area, &mut |html: &mut String| {
            let present = store::has_result_block(html, &addon.id);
            if present {
                store::upsert_result_block(html, &addon.id, formatted);
            }
            present
        });
        if !replaced {
            append_result_block(&mut *dom, element, &addon.id, formatted);
        }
        info!(addon = %addon.name, "Injected result into chat history");
        true
    }

    /// Render the result into the message's results panel.
    pub async fn inject_into_panel(&self, addon: &Addon, formatted: &str, message_key: &str) -> bool {
        let mut dom = self.dom.lock().await;
        let Some(element) = find_message_element_or_latest(&*dom, message_key) else {
            warn!(message_key, addon_id = %addon.id, "Message element not found for panel injection");
            return false;
        };

        render_panel(&mut *dom, element, message_key, addon, formatted, "Generated at");
        info!(addon = %addon.name, "Injected result into panel");
        true
    }

    // ── Indicators ──

    /// Show a loading indicator on the latest AI message.
    ///
    /// If no AI message is rendered yet, waits `indicator_retry_ms` once and
    /// tries again.
    pub async fn show_loading_indicator(&self, addon: &Addon) -> bool {
        {
            let mut dom = self.dom.lock().await;
            if let Some(element) = self.latest_ai(&*dom).await {
                attach_loading(&mut *dom, element, addon);
                return true;
            }
        }

        warn!(addon_id = %addon.id, "AI message element not found for loading indicator, retrying");
        tokio::time::sleep(Duration::from_millis(self.ui.indicator_retry_ms)).await;

        let mut dom = self.dom.lock().await;
        match self.latest_ai(&*dom).await {
            Some(element) => {
                attach_loading(&mut *dom, element, addon);
                true
            }
            None => {
                error!(addon_id = %addon.id, "AI message element still missing after retry");
                false
            }
        }
    }

    /// Remove the add-on's loading indicator wherever it is.
    pub async fn hide_loading_indicator(&self, addon: &Addon) -> bool {
        let mut dom = self.dom.lock().await;
        let body = dom.body();
        let indicators = dom.query_class_all(body, &format!("sidecar-loading-{}", addon.id));
        let found = !indicators.is_empty();
        for indicator in indicators {
            dom.remove(indicator);
        }
        if found {
            debug!(addon = %addon.name, "Removed loading indicator");
        }
        found
    }

    /// Show an error with a Retry button on the latest AI message.
    ///
    /// Replaces any earlier error for the same add-on.
    pub async fn show_error_indicator(&self, addon: &Addon, error: &str) -> bool {
        let mut dom = self.dom.lock().await;
        let Some(element) = self.latest_ai(&*dom).await else {
            warn!(addon_id = %addon.id, "AI message element not found for error indicator");
            return false;
        };

        let key = element_key(&*dom, element);
        let container = ensure_container(&mut *dom, element, &key);
        let error_class = format!("sidecar-error-{}", addon.id);
        if let Some(existing) = dom.query_class(container, &error_class) {
            dom.remove(existing);
        }

        let indicator = dom.create_element("div", &format!("sidecar-error {error_class}"));
        let text = dom.create_element("div", "");
        dom.set_inner_html(
            text,
            &format!(
                "<i class=\"fa-solid fa-exclamation-triangle\"></i> Error processing {}: {}",
                escape_html(&addon.name),
                escape_html(error)
            ),
        );
        dom.append_child(indicator, text);

        let retry = dom.create_element("button", "menu_button sidecar-retry");
        dom.set_attribute(retry, "data-addon-id", &addon.id);
        dom.set_attribute(retry, "data-message-id", &key);
        dom.set_inner_html(retry, "<i class=\"fa-solid fa-redo\"></i> Retry");
        dom.append_child(indicator, retry);

        dom.append_child(container, indicator);
        true
    }

    /// Remove the add-on's error indicator wherever it is.
    pub async fn clear_error_indicator(&self, addon_id: &str) -> bool {
        let mut dom = self.dom.lock().await;
        let body = dom.body();
        let errors = dom.query_class_all(body, &format!("sidecar-error-{addon_id}"));
        let found = !errors.is_empty();
        for node in errors {
            dom.remove(node);
        }
        found
    }

    /// Read the add-on and message a clicked Retry button points at.
    pub async fn retry_target(&self, button: NodeId) -> Option<RetryTarget> {
        let dom = self.dom.lock().await;
        Some(RetryTarget {
            addon_id: dom.attribute(button, "data-addon-id")?,
            message_key: dom.attribute(button, "data-message-id")?,
        })
    }

    // ── Edit in place ──

    /// Swap a result slot for an editor pre-filled with the stored raw result.
    pub async fn begin_edit(
        &self,
        addon: &Addon,
        message_key: &str,
        chat: &SharedChat,
    ) -> Option<EditSession> {
        let stored = {
            let chat = chat.read().await;
            position_of_key(&chat, message_key).and_then(|index| {
                match store::read_stored(&chat[index].mes, &addon.id) {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!(addon_id = %addon.id, error = %e, "Stored result unreadable, editing rendered text");
                        None
                    }
                }
            })
        };

        let mut dom = self.dom.lock().await;
        let element = find_message_element_or_latest(&*dom, message_key)?;
        let slot = dom.query_id(element, &content_slot_id(&addon.id))?;

        let current = stored.filter(|s| !s.is_empty()).unwrap_or_else(|| {
            let source = dom.query_class(slot, "addon_result_item").unwrap_or(slot);
            dom.text_content(source)
        });
        let original_html = dom.inner_html(slot);

        let editor = dom.create_element("div", "addon-edit-container");
        let textarea = dom.create_element("textarea", "text_pole");
        dom.set_text(textarea, &current);
        let controls = dom.create_element("div", "addon-edit-controls");
        let cancel = dom.create_element("button", "menu_button addon_edit_cancel");
        dom.set_inner_html(cancel, "<i class=\"fa-solid fa-times\"></i> Cancel");
        let save = dom.create_element("button", "menu_button addon_edit_save");
        dom.set_inner_html(save, "<i class=\"fa-solid fa-save\"></i> Save");
        dom.append_child(controls, cancel);
        dom.append_child(controls, save);
        dom.append_child(editor, textarea);
        dom.append_child(editor, controls);

        dom.set_inner_html(slot, "");
        dom.append_child(slot, editor);

        Some(EditSession {
            addon_id: addon.id.clone(),
            message_key: message_key.to_string(),
            slot,
            textarea,
            original_html,
        })
    }

    /// Put the slot back the way it was before editing.
    pub async fn cancel_edit(&self, session: EditSession) -> bool {
        let mut dom = self.dom.lock().await;
        if !dom.is_attached(session.slot) {
            return false;
        }
        dom.set_inner_html(session.slot, &session.original_html);
        true
    }

    /// Persist the edit and re-render the slot from it.
    pub async fn save_edit(
        &self,
        session: EditSession,
        addon: &Addon,
        new_content: &str,
        host: &HostContext,
    ) -> bool {
        if new_content.trim().is_empty() {
            warn!(addon_id = %addon.id, "Refusing to save an empty edit");
            return false;
        }

        let message = {
            let mut chat = host.chat.write().await;
            match position_of_key(&chat, &session.message_key) {
                Some(index) => {
                    let message = &mut chat[index];
                    store::update_result_in_metadata(message, &addon.id, new_content, Some(addon))
                        .then(|| message.clone())
                }
                None => {
                    warn!(message_key = %session.message_key, "Edited message is no longer in the chat");
                    None
                }
            }
        };

        if message.is_some()
            && let Err(e) = host.save_chat().await
        {
            error!(addon_id = %addon.id, error = %e, "Failed to save chat after edit");
        }

        let formatted = format_result(addon, new_content, message.as_ref(), true);
        let mut dom = self.dom.lock().await;
        if !dom.is_attached(session.slot) {
            warn!(addon_id = %addon.id, "Edited slot is gone, skipping re-render");
            return false;
        }
        render_slot(&mut *dom, session.slot, &formatted, "Edited at");
        true
    }

    // ── Other actions ──

    /// Text of a result slot, for the host to put on the clipboard.
    pub async fn copy_text(&self, addon_id: &str, message_key: &str) -> Option<String> {
        let dom = self.dom.lock().await;
        let element = find_message_element_or_latest(&*dom, message_key)?;
        let slot = dom.query_id(element, &content_slot_id(addon_id))?;
        Some(dom.text_content(slot).trim().to_string())
    }

    /// Delete an add-on's result from a message and from the document.
    pub async fn delete_result(&self, chat: &SharedChat, message_index: usize, addon_id: &str) -> bool {
        let (changed, snapshot) = {
            let mut chat = chat.write().await;
            let Some(message) = chat.get_mut(message_index) else {
                return false;
            };
            let changed = store::delete_result_from_metadata(message, addon_id);
            (changed, chat.clone())
        };

        if changed {
            let mut dom = self.dom.lock().await;
            if let Some(element) = resolve_message(&*dom, &snapshot, message_index) {
                remove_rendered(&mut *dom, element, addon_id);
            }
        }
        changed
    }
}

// ── Document helpers (called with the lock held) ──

pub(crate) fn content_slot_id(addon_id: &str) -> String {
    format!("addon-content-{addon_id}")
}

/// Strict id lookup, then positional AI-ordinal lookup.
pub(crate) fn resolve_message<D: Dom + ?Sized>(
    dom: &D,
    chat: &[ChatMessage],
    index: usize,
) -> Option<NodeId> {
    let key = chat.get(index)?.key(index);
    find_message_element(dom, &key).or_else(|| find_message_element_by_index(dom, chat, index))
}

pub(crate) fn append_result_block<D: Dom + ?Sized>(
    dom: &mut D,
    element: NodeId,
    addon_id: &str,
    formatted: &str,
) {
    let area = content_area(dom, element);
    dom.append_html(area, &store::result_block(addon_id, formatted));
}

/// Find the message's results container or create one after its content.
fn ensure_container<D: Dom + ?Sized>(dom: &mut D, element: NodeId, key: &str) -> NodeId {
    if let Some(container) = dom
        .query_class(element, &format!("sidecar-container-{key}"))
        .or_else(|| dom.query_class(element, "sidecar-container"))
    {
        return container;
    }

    let container = dom.create_element("div", &format!("sidecar-container sidecar-container-{key}"));
    let area = content_area(dom, element);
    if area == element {
        dom.append_child(element, container);
    } else {
        dom.insert_after(area, container);
    }
    container
}

fn attach_loading<D: Dom + ?Sized>(dom: &mut D, element: NodeId, addon: &Addon) {
    let key = element_key(dom, element);
    let container = ensure_container(dom, element, &key);
    let loading_class = format!("sidecar-loading-{}", addon.id);
    if dom.query_class(container, &loading_class).is_some() {
        return;
    }

    let indicator = dom.create_element("div", &format!("sidecar-loading {loading_class}"));
    dom.set_inner_html(
        indicator,
        &format!(
            "<i class=\"fa-solid fa-spinner fa-spin\"></i> <span>Processing {}...</span>",
            escape_html(&addon.name)
        ),
    );
    dom.append_child(container, indicator);
    debug!(addon = %addon.name, "Showing loading indicator");
}

/// Find or create the add-on's section and return its content slot.
fn ensure_section<D: Dom + ?Sized>(dom: &mut D, container: NodeId, addon: &Addon) -> NodeId {
    let section_class = format!("addon_section-{}", addon.id);
    if let Some(section) = dom.query_class(container, &section_class) {
        if let Some(slot) = dom.query_class(section, "addon_result_content") {
            dom.set_attribute(section, "open", "");
            return slot;
        }
        dom.remove(section);
    }

    let section = dom.create_element("details", &format!("addon_result_section {section_class}"));
    dom.set_attribute(section, "open", "");

    let summary = dom.create_element("summary", "addon_result_summary");
    let title = dom.create_element("span", "");
    dom.set_text(title, &addon.name);
    dom.append_child(summary, title);

    let actions = dom.create_element("div", "addon_result_actions");
    for (class, title_text, icon) in [
        ("menu_button addon_edit_button", "Edit Result", "fa-edit"),
        ("menu_button addon_copy_button", "Copy Result", "fa-copy"),
    ] {
        let button = dom.create_element("button", class);
        dom.set_attribute(button, "title", title_text);
        dom.set_attribute(button, "data-addon-id", &addon.id);
        dom.set_inner_html(button, &format!("<i class=\"fa-solid {icon}\"></i>"));
        dom.append_child(actions, button);
    }
    dom.append_child(summary, actions);

    let slot = dom.create_element("div", "addon_result_content");
    dom.set_attribute(slot, "id", &content_slot_id(&addon.id));

    dom.append_child(section, summary);
    dom.append_child(section, slot);
    dom.append_child(container, section);
    slot
}

/// Replace a slot's content with one result item and its timestamp line.
fn render_slot<D: Dom + ?Sized>(dom: &mut D, slot: NodeId, formatted: &str, stamp_label: &str) {
    dom.set_inner_html(slot, "");
    let item = dom.create_element("div", "addon_result_item");
    dom.set_inner_html(item, formatted);
    let stamp = dom.create_element("div", "addon_result_timestamp");
    dom.set_text(
        stamp,
        &format!("{stamp_label} {}", Local::now().format("%H:%M:%S")),
    );
    dom.append_child(item, stamp);
    dom.append_child(slot, item);
}

pub(crate) fn render_panel<D: Dom + ?Sized>(
    dom: &mut D,
    element: NodeId,
    message_key: &str,
    addon: &Addon,
    formatted: &str,
    stamp_label: &str,
) {
    let container = ensure_container(dom, element, message_key);
    let slot = ensure_section(dom, container, addon);
    render_slot(dom, slot, formatted, stamp_label);
}

/// Drop the add-on's panel section and any result block in the content area.
fn remove_rendered<D: Dom + ?Sized>(dom: &mut D, element: NodeId, addon_id: &str) {
    if let Some(section) = dom.query_class(element, &format!("addon_section-{addon_id}")) {
        dom.remove(section);
    }

    let area = content_area(dom, element);
    dom.edit_markup(area, &mut |html: &mut String| {
        store::remove_result_block(html, addon_id)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use sidecar_core::{ResponseLocation, ResultFormat};

    fn chat() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("Ann", "Tell me a story"),
            ChatMessage::character("Bot", "Once upon a time"),
        ]
    }

    fn formatter(chat: &[ChatMessage]) -> ResultFormatter<MemoryDom> {
        ResultFormatter::new(
            Arc::new(Mutex::new(MemoryDom::from_chat(chat))),
            UiConfig::default(),
        )
    }

    fn panel_addon() -> Addon {
        Addon::new("summary", "Summary", "{{lastMessages}}")
    }

    async fn count(f: &ResultFormatter<MemoryDom>, class: &str) -> usize {
        let dom = f.dom.lock().await;
        let body = dom.body();
        dom.query_class_all(body, class).len()
    }

    #[tokio::test]
    async fn chat_history_injection_appends_block() {
        let f = formatter(&chat());
        let addon = panel_addon().with_location(ResponseLocation::ChatHistory);
        assert!(f.inject_into_chat_history("msg_1", &addon, "\n\nHello").await);

        let dom = f.dom.lock().await;
        let element = dom.message_elements()[1];
        let area = content_area(&*dom, element);
        assert_eq!(
            dom.inner_html(area),
            "Once upon a time<!-- addon-result:summary -->\n\nHello<!-- /addon-result:summary -->"
        );
    }

    #[tokio::test]
    async fn chat_history_injection_replaces_previous_block() {
        let f = formatter(&chat());
        let addon = panel_addon().with_location(ResponseLocation::ChatHistory);
        f.inject_into_chat_history("msg_1", &addon, "\n\nfirst").await;
        f.inject_into_chat_history("msg_1", &addon, "\n\nsecond").await;

        let dom = f.dom.lock().await;
        let element = dom.message_elements()[1];
        let html = dom.inner_html(content_area(&*dom, element));
        assert_eq!(html.matches("<!-- addon-result:summary -->").count(), 1);
        assert!(html.contains("second"));
        assert!(!html.contains("first"));
    }

    #[tokio::test]
    async fn bare_message_keeps_its_panel_when_blocks_change() {
        let mut dom = MemoryDom::new();
        let element = dom.create_element("div", "mes mes_assistant");
        dom.set_attribute(element, "mesid", "0");
        dom.append_html(element, "Plain reply");
        let body = dom.body();
        dom.append_child(body, element);
        let f = ResultFormatter::new(Arc::new(Mutex::new(dom)), UiConfig::default());

        let notes = Addon::new("notes", "Notes", "").with_location(ResponseLocation::ChatHistory);
        assert!(f.inject_into_chat_history("msg_0", &notes, "\n\nfirst").await);
        assert!(f.inject_into_panel(&panel_addon(), "<p>panel</p>", "msg_0").await);
        let container = {
            let dom = f.dom.lock().await;
            dom.query_class(element, "sidecar-container").unwrap()
        };

        assert!(f.inject_into_chat_history("msg_0", &notes, "\n\nsecond").await);
        assert!(f.inject_into_panel(&panel_addon(), "<p>again</p>", "msg_0").await);
        assert_eq!(count(&f, "sidecar-container").await, 1);

        let chat: SharedChat = Arc::new(tokio::sync::RwLock::new(vec![{
            let mut message = ChatMessage::character("Bot", "Plain reply");
            store::save_result_to_metadata(&mut message, &notes, "second");
            message
        }]));
        assert!(f.delete_result(&chat, 0, "notes").await);

        let dom = f.dom.lock().await;
        assert!(dom.is_attached(container));
        assert_eq!(dom.query_class(element, "sidecar-container"), Some(container));
        let html = dom.inner_html(element);
        assert!(html.starts_with("Plain reply<div"));
        assert!(!html.contains("addon-result:notes"));
        assert!(html.contains("again"));
    }

    #[tokio::test]
    async fn panel_injection_builds_container_once() {
        let f = formatter(&chat());
        let addon = panel_addon();
        assert!(f.inject_into_panel(&addon, "<p>first</p>", "msg_1").await);
        assert!(f.inject_into_panel(&addon, "<p>second</p>", "msg_1").await);

        assert_eq!(count(&f, "sidecar-container").await, 1);
        assert_eq!(count(&f, "addon_section-summary").await, 1);
        assert_eq!(count(&f, "addon_result_item").await, 1);

        let dom = f.dom.lock().await;
        let element = dom.message_elements()[1];
        let container = dom.query_class(element, "sidecar-container-msg_1").unwrap();
        let area = content_area(&*dom, element);
        assert_eq!(dom.parent(container), Some(element));
        assert_eq!(dom.parent(area), Some(element));

        let section = dom.query_class(container, "addon_section-summary").unwrap();
        assert_eq!(dom.attribute(section, "open").as_deref(), Some(""));
        let slot = dom.find_by_id("addon-content-summary").unwrap();
        let html = dom.inner_html(slot);
        assert!(html.contains("<p>second</p>"));
        assert!(!html.contains("first"));
        assert!(html.contains("Generated at "));
    }

    #[tokio::test]
    async fn panel_never_lands_on_user_message() {
        let f = formatter(&chat());
        f.inject_into_panel(&panel_addon(), "x", "msg_0").await;
        let dom = f.dom.lock().await;
        let user = dom.message_elements()[0];
        assert!(dom.query_class(user, "sidecar-container").is_none());
    }

    #[tokio::test]
    async fn loading_indicator_is_not_duplicated() {
        let f = formatter(&chat());
        let addon = panel_addon();
        assert!(f.show_loading_indicator(&addon).await);
        assert!(f.show_loading_indicator(&addon).await);
        assert_eq!(count(&f, "sidecar-loading-summary").await, 1);

        assert!(f.hide_loading_indicator(&addon).await);
        assert_eq!(count(&f, "sidecar-loading-summary").await, 0);
        assert!(!f.hide_loading_indicator(&addon).await);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_indicator_retries_once() {
        let f = Arc::new(formatter(&[ChatMessage::user("Ann", "hi")]));
        let addon = panel_addon();

        let task = {
            let f = Arc::clone(&f);
            let addon = addon.clone();
            tokio::spawn(async move { f.show_loading_indicator(&addon).await })
        };

        // The AI reply renders while the indicator waits for its retry.
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let mut dom = f.dom.lock().await;
            let chat_root = dom.find_by_id("chat").unwrap();
            let reply = dom.create_element("div", "mes mes_assistant");
            dom.append_child(chat_root, reply);
        }

        assert!(task.await.unwrap());
        assert_eq!(count(&f, "sidecar-loading-summary").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_indicator_gives_up_after_retry() {
        let f = formatter(&[ChatMessage::user("Ann", "hi")]);
        assert!(!f.show_loading_indicator(&panel_addon()).await);
        assert_eq!(count(&f, "sidecar-loading").await, 0);
    }

    #[tokio::test]
    async fn error_indicator_escapes_and_replaces() {
        let f = formatter(&chat());
        let addon = Addon::new("a", "<Sum & Co>", "");
        assert!(f.show_error_indicator(&addon, "first").await);
        assert!(f.show_error_indicator(&addon, "bad <script>").await);
        assert_eq!(count(&f, "sidecar-error-a").await, 1);

        let dom = f.dom.lock().await;
        let body = dom.body();
        let indicator = dom.query_class(body, "sidecar-error-a").unwrap();
        let html = dom.inner_html(indicator);
        assert!(html.contains("Error processing &lt;Sum &amp; Co&gt;: bad &lt;script&gt;"));
        assert!(!html.contains("first"));
    }

    #[tokio::test]
    async fn retry_button_points_back_at_addon_and_message() {
        let f = formatter(&chat());
        f.show_error_indicator(&panel_addon(), "timeout").await;

        let button = {
            let dom = f.dom.lock().await;
            let body = dom.body();
            dom.query_class(body, "sidecar-retry").unwrap()
        };
        assert_eq!(
            f.retry_target(button).await,
            Some(RetryTarget {
                addon_id: "summary".into(),
                message_key: "msg_1".into(),
            })
        );

        assert!(f.clear_error_indicator("summary").await);
        assert_eq!(count(&f, "sidecar-error").await, 0);
    }

    #[tokio::test]
    async fn edit_prefills_stored_result_and_cancel_restores() {
        let mut log = chat();
        let addon = panel_addon();
        store::save_result_to_metadata(&mut log[1], &addon, "raw **markdown**");
        let f = formatter(&log);
        let host = HostContext::new(log);
        f.inject_into_panel(&addon, "<p>rendered</p>", "msg_1").await;

        let session = f.begin_edit(&addon, "msg_1", &host.chat).await.unwrap();
        {
            let dom = f.dom.lock().await;
            assert_eq!(dom.text_content(session.textarea()), "raw **markdown**");
            assert_eq!(count_in(&dom, "addon-edit-container"), 1);
        }

        assert!(f.cancel_edit(session).await);
        let dom = f.dom.lock().await;
        let slot = dom.find_by_id("addon-content-summary").unwrap();
        assert!(dom.inner_html(slot).contains("<p>rendered</p>"));
        assert_eq!(count_in(&dom, "addon-edit-container"), 0);
    }

    fn count_in(dom: &MemoryDom, class: &str) -> usize {
        dom.query_class_all(dom.body(), class).len()
    }

    #[tokio::test]
    async fn save_edit_persists_and_rerenders() {
        let mut log = chat();
        let addon = panel_addon().with_format(ResultFormat::Separate);
        store::save_result_to_metadata(&mut log[1], &addon, "old");
        let f = formatter(&log);
        let host = HostContext::new(log);
        f.inject_into_panel(&addon, "old", "msg_1").await;

        let session = f.begin_edit(&addon, "msg_1", &host.chat).await.unwrap();
        assert!(f.save_edit(session, &addon, "<b>new</b>", &host).await);

        let chat = host.chat.read().await;
        assert_eq!(
            store::read_stored(&chat[1].mes, "summary").unwrap().as_deref(),
            Some("<b>new</b>")
        );
        assert!(store::is_edited(&chat[1].mes, "summary"));

        let dom = f.dom.lock().await;
        let slot = dom.find_by_id("addon-content-summary").unwrap();
        let html = dom.inner_html(slot);
        assert!(html.contains("<b>new</b>"));
        assert!(html.contains("Edited at "));
        assert!(!html.contains("--- Summary ---"));
    }

    #[tokio::test]
    async fn save_edit_rejects_empty_content() {
        let log = chat();
        let addon = panel_addon();
        let f = formatter(&log);
        let host = HostContext::new(log);
        f.inject_into_panel(&addon, "x", "msg_1").await;
        let session = f.begin_edit(&addon, "msg_1", &host.chat).await.unwrap();
        assert!(!f.save_edit(session, &addon, "   ", &host).await);
    }

    #[tokio::test]
    async fn copy_returns_slot_text() {
        let f = formatter(&chat());
        f.inject_into_panel(&panel_addon(), "<p>Copy me</p>", "msg_1").await;
        let text = f.copy_text("summary", "msg_1").await.unwrap();
        assert!(text.starts_with("Copy meGenerated at "));
        assert!(f.copy_text("missing", "msg_1").await.is_none());
    }

    #[tokio::test]
    async fn delete_clears_transcript_and_document() {
        let mut log = chat();
        let history = panel_addon().with_location(ResponseLocation::ChatHistory);
        let panel = Addon::new("mood", "Mood", "");
        store::save_result_to_metadata(&mut log[1], &history, "story summary");
        store::save_result_to_metadata(&mut log[1], &panel, "calm");
        let f = formatter(&log);
        let host = HostContext::new(log);
        f.inject_into_chat_history("msg_1", &history, "\n\nstory summary").await;
        f.inject_into_panel(&panel, "calm", "msg_1").await;

        assert!(f.delete_result(&host.chat, 1, "summary").await);
        assert!(f.delete_result(&host.chat, 1, "mood").await);
        assert!(!f.delete_result(&host.chat, 1, "mood").await);
        assert!(!f.delete_result(&host.chat, 7, "mood").await);

        assert_eq!(host.chat.read().await[1].mes, "Once upon a time");
        let dom = f.dom.lock().await;
        let element = dom.message_elements()[1];
        assert!(!dom.inner_html(content_area(&*dom, element)).contains("addon-result"));
        assert!(dom.query_class(element, "addon_section-mood").is_none());
    }
}
