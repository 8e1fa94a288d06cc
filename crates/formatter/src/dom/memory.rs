//! In-memory document for tests and for hosts without a browser.
//!
//! Elements live in an arena and are never freed. Markup written through
//! `set_inner_html` / `append_html` is kept as an opaque fragment: it renders
//! back out verbatim but is not parsed into queryable elements. Only elements
//! created with `create_element` take part in class and id lookups.

use super::{Dom, NodeId};
use sidecar_core::ChatMessage;
use sidecar_security::escape_html;

#[derive(Debug, Clone)]
enum Child {
    Element(NodeId),
    Html(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// An arena-backed document.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Element>,
    body: NodeId,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element::new("body")],
            body: NodeId(0),
        }
    }

    /// Render a chat the way the host does: one `.mes` element per message
    /// with its text in a `.mes_text` child.
    ///
    /// Each element carries `mesid` (the chat index) and `data-is-user`.
    /// Messages with an explicit id also get `data-message-id`.
    pub fn from_chat(chat: &[ChatMessage]) -> Self {
        let mut dom = Self::new();
        let container = dom.create_element("div", "chat");
        dom.set_attribute(container, "id", "chat");
        dom.append_child(dom.body, container);

        for (index, message) in chat.iter().enumerate() {
            let role = if message.is_user { "mes_user" } else { "mes_assistant" };
            let element = dom.create_element("div", &format!("mes {role}"));
            dom.set_attribute(element, "mesid", &index.to_string());
            dom.set_attribute(
                element,
                "data-is-user",
                if message.is_user { "true" } else { "false" },
            );
            if let Some(id) = &message.id {
                dom.set_attribute(element, "data-message-id", &id.to_string());
            }

            let text = dom.create_element("div", "mes_text");
            dom.set_inner_html(text, &message.mes);
            dom.append_child(element, text);
            dom.append_child(container, element);
        }

        dom
    }

    /// Serialize the whole body.
    pub fn to_html(&self) -> String {
        self.inner_html(self.body)
    }

    fn node(&self, id: NodeId) -> &Element {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Element {
        &mut self.nodes[id.0]
    }

    /// Descendants of `root` in document order, excluding `root`.
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.element_children(id).into_iter().rev());
        }
        out
    }

    fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .filter_map(|c| match c {
                Child::Element(e) => Some(*e),
                Child::Html(_) => None,
            })
            .collect()
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.node(node).parent {
            self.node_mut(parent)
                .children
                .retain(|c| !matches!(c, Child::Element(e) if *e == node));
            self.node_mut(node).parent = None;
        }
    }

    /// Drop all children, detaching element children.
    fn clear_children(&mut self, node: NodeId) {
        for child in self.element_children(node) {
            self.node_mut(child).parent = None;
        }
        self.node_mut(node).children.clear();
    }

    fn outer_html(&self, id: NodeId) -> String {
        let element = self.node(id);
        let mut out = format!("<{}", element.tag);
        for (name, value) in &element.attributes {
            if value.is_empty() {
                out.push_str(&format!(" {name}"));
            } else {
                out.push_str(&format!(" {name}=\"{}\"", escape_html(value)));
            }
        }
        out.push('>');
        out.push_str(&self.inner_html(id));
        out.push_str(&format!("</{}>", element.tag));
        out
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom for MemoryDom {
    fn body(&self) -> NodeId {
        self.body
    }

    fn message_elements(&self) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|id| self.has_class(*id, "mes") || self.has_class(*id, "message"))
            .collect()
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.body {
                return true;
            }
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node)
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let attributes = &mut self.node_mut(node).attributes;
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    fn query_class(&self, root: NodeId, class: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.has_class(*id, class))
    }

    fn query_class_all(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    fn query_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|n| self.attribute(*n, "id").as_deref() == Some(id))
    }

    fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .find(|n| self.attribute(*n, name).as_deref() == Some(value))
    }

    fn create_element(&mut self, tag: &str, classes: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut element = Element::new(tag);
        if !classes.is_empty() {
            element
                .attributes
                .push(("class".to_string(), classes.to_string()));
        }
        self.nodes.push(element);
        id
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(parent).children.push(Child::Element(child));
        self.node_mut(child).parent = Some(parent);
    }

    fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.node(reference).parent else {
            return;
        };
        self.detach(node);
        let children = &mut self.node_mut(parent).children;
        let position = children
            .iter()
            .position(|c| matches!(c, Child::Element(e) if *e == reference))
            .map_or(children.len(), |p| p + 1);
        children.insert(position, Child::Element(node));
        self.node_mut(node).parent = Some(parent);
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn inner_html(&self, node: NodeId) -> String {
        self.node(node)
            .children
            .iter()
            .map(|c| match c {
                Child::Element(e) => self.outer_html(*e),
                Child::Html(html) => html.clone(),
            })
            .collect()
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        self.clear_children(node);
        if !html.is_empty() {
            self.node_mut(node)
                .children
                .push(Child::Html(html.to_string()));
        }
    }

    fn append_html(&mut self, node: NodeId, html: &str) {
        if !html.is_empty() {
            self.node_mut(node)
                .children
                .push(Child::Html(html.to_string()));
        }
    }

    fn edit_markup(&mut self, node: NodeId, edit: &mut dyn FnMut(&mut String) -> bool) -> bool {
        let mut changed = false;
        let children = &mut self.node_mut(node).children;
        for child in children.iter_mut() {
            if let Child::Html(html) = child {
                changed |= edit(html);
            }
        }
        children.retain(|c| !matches!(c, Child::Html(html) if html.is_empty()));
        changed
    }

    fn text_content(&self, node: NodeId) -> String {
        self.node(node)
            .children
            .iter()
            .map(|c| match c {
                Child::Element(e) => self.text_content(*e),
                Child::Html(html) => strip_markup(html),
            })
            .collect()
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.set_inner_html(node, &escape_html(text));
    }
}

/// Drop tags and comments, then decode the entities `escape_html` produces.
///
/// A `<` that cannot open a tag, or whose tag never closes, is kept as text.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let opens_tag = tail[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
        let end = if !opens_tag {
            None
        } else if tail.starts_with("<!--") {
            tail.find("-->").map(|e| e + 3)
        } else {
            tail.find('>').map(|e| e + 1)
        };
        match end {
            Some(end) => rest = &tail[end..],
            None => {
                out.push('<');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}
