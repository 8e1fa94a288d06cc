//! The document seam.
//!
//! Results are projected into the host's rendered chat through this trait.
//! A browser host implements it over the live document; [`MemoryDom`] is an
//! arena-backed implementation used by the CLI and the test suites.
//!
//! Nodes are addressed by opaque [`NodeId`]s. A node id stays valid after the
//! node is removed, but [`Dom::is_attached`] reports `false` for it.

mod memory;

pub use memory::MemoryDom;

/// Opaque handle to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The element operations the presenter needs from a document.
pub trait Dom: Send + Sync {
    /// The document body. Every attached node descends from it.
    fn body(&self) -> NodeId;

    /// All `.mes, .message` elements in document order.
    fn message_elements(&self) -> Vec<NodeId>;

    /// Whether the node is still reachable from the body.
    fn is_attached(&self, node: NodeId) -> bool;

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// First descendant of `root` (excluding `root`) carrying `class`.
    fn query_class(&self, root: NodeId, class: &str) -> Option<NodeId>;

    /// All descendants of `root` carrying `class`, in document order.
    fn query_class_all(&self, root: NodeId, class: &str) -> Vec<NodeId>;

    /// First descendant of `root` whose `id` attribute equals `id`.
    fn query_id(&self, root: NodeId, id: &str) -> Option<NodeId>;

    /// First attached element whose attribute `name` equals `value`.
    fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId>;

    /// Create a detached element with the given space-separated classes.
    fn create_element(&mut self, tag: &str, classes: &str) -> NodeId;

    fn append_child(&mut self, parent: NodeId, child: NodeId);

    /// Insert `node` as the next sibling of `reference`.
    fn insert_after(&mut self, reference: NodeId, node: NodeId);

    /// Detach the node from its parent.
    fn remove(&mut self, node: NodeId);

    fn inner_html(&self, node: NodeId) -> String;

    /// Replace all children with the given markup.
    fn set_inner_html(&mut self, node: NodeId, html: &str);

    /// Append markup after the existing children.
    fn append_html(&mut self, node: NodeId, html: &str);

    /// Run `edit` over each run of markup directly under `node`, leaving
    /// element children in place. Returns whether any run was changed.
    fn edit_markup(&mut self, node: NodeId, edit: &mut dyn FnMut(&mut String) -> bool) -> bool;

    /// Rendered text with markup stripped.
    fn text_content(&self, node: NodeId) -> String;

    /// Replace all children with a text node.
    fn set_text(&mut self, node: NodeId, text: &str);

    // ── Provided ──

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "id")
    }

    /// First attached element whose `id` attribute equals `id`.
    fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.query_id(self.body(), id)
    }

    fn has_descendant_with_class(&self, root: NodeId, class: &str) -> bool {
        self.query_class(root, class).is_some()
    }
}
