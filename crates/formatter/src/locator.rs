//! Finding AI message elements in the rendered chat.
//!
//! Indicators and results must only ever attach to AI messages. When an
//! element carries no role signal at all it is treated as AI: attaching to
//! the wrong AI message is recoverable, attaching to a user message is not.

use crate::dom::{Dom, NodeId};
use sidecar_core::ChatMessage;
use std::time::Duration;
use tokio::time::Instant;

/// Whether the element renders an AI message.
///
/// Signals in priority order: assistant class or descendant, user class or
/// descendant, `data-is-user`, `data-role`, else AI.
pub fn is_ai_message<D: Dom + ?Sized>(dom: &D, node: NodeId) -> bool {
    if dom.has_class(node, "assistant")
        || dom.has_class(node, "mes_assistant")
        || dom.has_descendant_with_class(node, "mes_assistant")
    {
        return true;
    }

    if dom.has_class(node, "user")
        || dom.has_class(node, "mes_user")
        || dom.has_descendant_with_class(node, "mes_user")
    {
        return false;
    }

    match dom.attribute(node, "data-is-user").as_deref() {
        Some("true") => return false,
        Some("false") => return true,
        _ => {}
    }

    match dom.attribute(node, "data-role").as_deref() {
        Some("user") => false,
        Some("assistant") => true,
        _ => true,
    }
}

/// The element a message's text is rendered into.
pub fn content_area<D: Dom + ?Sized>(dom: &D, message: NodeId) -> NodeId {
    dom.query_class(message, "mes_text")
        .or_else(|| dom.query_class(message, "message"))
        .unwrap_or(message)
}

/// The most recent AI message element, uncached.
pub fn latest_ai_message<D: Dom + ?Sized>(dom: &D) -> Option<NodeId> {
    dom.message_elements()
        .into_iter()
        .rev()
        .find(|node| is_ai_message(dom, *node))
}

/// Resolve an AI message element by its DOM id, `data-message-id`, or, for
/// `msg_{n}` keys, its `mesid`.
pub fn find_message_element<D: Dom + ?Sized>(dom: &D, message_key: &str) -> Option<NodeId> {
    dom.find_by_id(message_key)
        .filter(|node| is_ai_message(dom, *node))
        .or_else(|| {
            dom.find_by_attribute("data-message-id", message_key)
                .filter(|node| is_ai_message(dom, *node))
        })
        .or_else(|| {
            let index = message_key.strip_prefix("msg_")?;
            dom.find_by_attribute("mesid", index)
                .filter(|node| is_ai_message(dom, *node))
        })
}

/// Like [`find_message_element`], falling back to the latest AI message.
pub fn find_message_element_or_latest<D: Dom + ?Sized>(
    dom: &D,
    message_key: &str,
) -> Option<NodeId> {
    find_message_element(dom, message_key).or_else(|| latest_ai_message(dom))
}

/// Map a chat-log index to the DOM element with the same AI ordinal.
///
/// The n-th AI message with text in the chat corresponds to the n-th AI
/// element in the document. Returns `None` for user or empty messages.
pub fn find_message_element_by_index<D: Dom + ?Sized>(
    dom: &D,
    chat: &[ChatMessage],
    index: usize,
) -> Option<NodeId> {
    let target = chat.get(index)?;
    if target.is_user || target.mes.is_empty() {
        return None;
    }

    let ordinal = chat[..index]
        .iter()
        .filter(|m| !m.is_user && !m.mes.is_empty())
        .count();

    dom.message_elements()
        .into_iter()
        .filter(|node| is_ai_message(dom, *node))
        .nth(ordinal)
}

/// A stable key for an element: its id, `data-message-id`, or `msg_{mesid}`.
pub fn element_key<D: Dom + ?Sized>(dom: &D, node: NodeId) -> String {
    if let Some(id) = dom.element_id(node).filter(|id| !id.is_empty()) {
        return id;
    }
    if let Some(id) = dom.attribute(node, "data-message-id") {
        return id;
    }
    if let Some(index) = dom.attribute(node, "mesid") {
        return format!("msg_{index}");
    }
    let position = dom
        .message_elements()
        .iter()
        .position(|n| *n == node)
        .unwrap_or_default();
    format!("msg_{position}")
}

// ── Latest-AI-message cache ──

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    node: Option<NodeId>,
    message_count: usize,
    stamped_at: Instant,
}

/// Short-lived cache of the latest AI message lookup.
///
/// An entry is reused only while the number of message elements is unchanged,
/// it is younger than the TTL, and the cached node is still attached.
#[derive(Debug, Clone)]
pub struct MessageCache {
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl MessageCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn latest_ai_message<D: Dom + ?Sized>(&mut self, dom: &D) -> Option<NodeId> {
        let messages = dom.message_elements();
        let now = Instant::now();

        if let Some(entry) = self.entry
            && let Some(node) = entry.node
            && entry.message_count == messages.len()
            && now.duration_since(entry.stamped_at) < self.ttl
            && dom.is_attached(node)
        {
            return Some(node);
        }

        let node = messages
            .iter()
            .rev()
            .copied()
            .find(|node| is_ai_message(dom, *node));

        self.entry = Some(CacheEntry {
            node,
            message_count: messages.len(),
            stamped_at: now,
        });
        node
    }

    /// Forget the cached element. Call when new messages arrive.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
