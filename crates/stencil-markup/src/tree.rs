//! Arena-backed node tree.
//!
//! Nodes live in a single `Vec` owned by the [`Document`] and are addressed by
//! [`NodeId`]. Ids never move or get reused, so a pass that replaces a node in
//! the middle of a walk can keep using the ids it already collected: the old
//! node is simply detached, and the replacement takes over its slot in the
//! parent's child list.
//!
//! The tree is generic over `E`, the payload of [`Node::Embedded`] nodes. The
//! parser never produces embedded nodes; later passes use them to splice
//! compiled fragments back into the tree.

use indexmap::IndexMap;

use crate::error::TreeError;

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// How an element's opening tag was written.
///
/// `Close` only appears on tokens; elements in a tree are always `Open` or
/// `SelfClosing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    Open,
    Close,
    SelfClosing,
}

/// An element together with the exact text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Namespace prefix (`tpl` in `<tpl:if>`), if any.
    pub namespace: Option<String>,
    /// Local tag name (`if` in `<tpl:if>`).
    pub name: String,
    /// Attributes in source order.
    pub attributes: IndexMap<String, String>,
    pub open_kind: OpenKind,
    /// The opening tag exactly as written.
    pub raw_open: String,
    /// The closing tag exactly as written; `None` for self-closing or
    /// implicitly closed elements.
    pub raw_close: Option<String>,
}

impl Element {
    /// `prefix:name`, or just `name` without a namespace.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Looks up an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the element belongs to the given namespace.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    pub fn is_self_closing(&self) -> bool {
        self.open_kind == OpenKind::SelfClosing
    }
}

/// Node payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<E> {
    Document,
    Element(Element),
    Text(String),
    /// A full `<!-- ... -->` comment, delimiters included.
    Comment(String),
    /// A full `<![CDATA[ ... ]]>` section, delimiters included.
    CData(String),
    /// A full `<!DOCTYPE ...>` declaration.
    DocType(String),
    /// A compiled fragment spliced in by a later pass.
    Embedded(E),
}

impl<E> Node<E> {
    fn can_own_children(&self) -> bool {
        match self {
            Node::Document => true,
            Node::Element(el) => !el.is_self_closing(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<E> {
    node: Node<E>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    line: usize,
}

/// A parsed document.
#[derive(Debug, Clone)]
pub struct Document<E = ()> {
    slots: Vec<Slot<E>>,
}

impl<E> Default for Document<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Document<E> {
    /// Creates an empty document holding only its root.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                node: Node::Document,
                parent: None,
                children: Vec::new(),
                line: 1,
            }],
        }
    }

    /// The document root.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes ever created, detached ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node<E> {
        &self.slots[id.0].node
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<E> {
        &mut self.slots[id.0].node
    }

    /// The element at `id`, if the node is one.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.node(id) {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// 1-based source line where the node starts.
    pub fn line(&self, id: NodeId) -> usize {
        self.slots[id.0].line
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    /// Creates a detached node.
    pub fn create(&mut self, node: Node<E>, line: usize) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node,
            parent: None,
            children: Vec::new(),
            line,
        });
        id
    }

    /// Appends `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if child == self.root() {
            return Err(TreeError::Root);
        }
        if !self.slots[parent.0].node.can_own_children() {
            return Err(TreeError::NotAContainer(parent.0));
        }
        self.detach(child);
        self.slots[parent.0].children.push(child);
        self.slots[child.0].parent = Some(parent);
        Ok(())
    }

    /// Puts `new` where `old` is and detaches `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        if old == new {
            return Ok(());
        }
        if old == self.root() || new == self.root() {
            return Err(TreeError::Root);
        }
        let parent = self.slots[old.0].parent.ok_or(TreeError::Detached(old.0))?;
        self.detach(new);
        let pos = self.position(parent, old);
        self.slots[parent.0].children[pos] = new;
        self.slots[new.0].parent = Some(parent);
        self.slots[old.0].parent = None;
        Ok(())
    }

    /// Inserts `node` immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<(), TreeError> {
        self.insert_all_before(anchor, &[node])
    }

    /// Inserts `nodes`, in order, immediately before `anchor`.
    pub fn insert_all_before(&mut self, anchor: NodeId, nodes: &[NodeId]) -> Result<(), TreeError> {
        if nodes.contains(&self.root()) {
            return Err(TreeError::Root);
        }
        let parent = self.slots[anchor.0]
            .parent
            .ok_or(TreeError::Detached(anchor.0))?;
        for &node in nodes {
            self.detach(node);
        }
        let pos = self.position(parent, anchor);
        let siblings = &mut self.slots[parent.0].children;
        siblings.splice(pos..pos, nodes.iter().copied());
        for &node in nodes {
            self.slots[node.0].parent = Some(parent);
        }
        Ok(())
    }

    /// Removes `node` from its parent. The node and its subtree stay in the
    /// arena and can be re-attached later.
    pub fn remove(&mut self, node: NodeId) -> Result<(), TreeError> {
        if node == self.root() {
            return Err(TreeError::Root);
        }
        if self.slots[node.0].parent.is_none() {
            return Err(TreeError::Detached(node.0));
        }
        self.detach(node);
        Ok(())
    }

    /// Like [`remove`](Self::remove), but a no-op on detached nodes.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.slots[node.0].parent.take() {
            let siblings = &mut self.slots[parent.0].children;
            if let Some(pos) = siblings.iter().position(|&c| c == node) {
                siblings.remove(pos);
            }
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.slots[node.0].parent?;
        let siblings = &self.slots[parent.0].children;
        let pos = siblings.iter().position(|&c| c == node)?;
        siblings.get(pos + 1).copied()
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.slots[node.0].parent?;
        let siblings = &self.slots[parent.0].children;
        let pos = siblings.iter().position(|&c| c == node)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Whether the node is text consisting only of whitespace.
    pub fn is_blank_text(&self, node: NodeId) -> bool {
        matches!(self.node(node), Node::Text(t) if t.trim().is_empty())
    }

    /// Rebuilds the source text of `node` and its subtree from the raw text
    /// kept on each node. Embedded nodes contribute nothing.
    pub fn source_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_source(node, &mut out);
        out
    }

    /// Source text of the children of `node`, without its own tags.
    pub fn inner_source_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_source(child, &mut out);
        }
        out
    }

    fn write_source(&self, node: NodeId, out: &mut String) {
        match self.node(node) {
            Node::Document => {
                for &child in self.children(node) {
                    self.write_source(child, out);
                }
            }
            Node::Element(el) => {
                out.push_str(&el.raw_open);
                for &child in self.children(node) {
                    self.write_source(child, out);
                }
                if let Some(close) = &el.raw_close {
                    out.push_str(close);
                }
            }
            Node::Text(s) | Node::Comment(s) | Node::CData(s) | Node::DocType(s) => {
                out.push_str(s)
            }
            Node::Embedded(_) => {}
        }
    }

    fn position(&self, parent: NodeId, child: NodeId) -> usize {
        self.slots[parent.0]
            .children
            .iter()
            .position(|&c| c == child)
            .unwrap_or(self.slots[parent.0].children.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(doc: &mut Document, s: &str) -> NodeId {
        doc.create(Node::Text(s.to_string()), 1)
    }

    fn names(doc: &Document, parent: NodeId) -> Vec<String> {
        doc.children(parent)
            .iter()
            .map(|&c| match doc.node(c) {
                Node::Text(t) => t.clone(),
                _ => "?".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_append_and_siblings() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = text(&mut doc, "a");
        let b = text(&mut doc, "b");
        doc.append(root, a).unwrap();
        doc.append(root, b).unwrap();

        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.prev_sibling(b), Some(a));
        assert_eq!(doc.prev_sibling(a), None);
        assert_eq!(doc.parent(b), Some(root));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut doc = Document::new();
        let root = doc.root();
        for s in ["a", "b", "c"] {
            let n = text(&mut doc, s);
            doc.append(root, n).unwrap();
        }
        let b = doc.children(root)[1];
        let x = text(&mut doc, "x");
        doc.replace(b, x).unwrap();

        assert_eq!(names(&doc, root), vec!["a", "x", "c"]);
        assert_eq!(doc.parent(b), None);
        assert_eq!(doc.parent(x), Some(root));
    }

    #[test]
    fn test_insert_all_before_preserves_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let c = text(&mut doc, "c");
        doc.append(root, c).unwrap();
        let a = text(&mut doc, "a");
        let b = text(&mut doc, "b");
        doc.insert_all_before(c, &[a, b]).unwrap();

        assert_eq!(names(&doc, root), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_detaches_but_keeps_subtree() {
        let mut doc: Document = Document::new();
        let root = doc.root();
        let el = doc.create(
            Node::Element(Element {
                namespace: None,
                name: "p".into(),
                attributes: IndexMap::new(),
                open_kind: OpenKind::Open,
                raw_open: "<p>".into(),
                raw_close: Some("</p>".into()),
            }),
            1,
        );
        doc.append(root, el).unwrap();
        let t = text(&mut doc, "hi");
        doc.append(el, t).unwrap();

        doc.remove(el).unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.source_text(el), "<p>hi</p>");
        assert_eq!(doc.remove(el), Err(TreeError::Detached(el.index())));
    }

    #[test]
    fn test_text_cannot_own_children() {
        let mut doc = Document::new();
        let a = text(&mut doc, "a");
        let b = text(&mut doc, "b");
        assert_eq!(doc.append(a, b), Err(TreeError::NotAContainer(a.index())));
    }

    #[test]
    fn test_root_cannot_be_replaced() {
        let mut doc = Document::new();
        let a = text(&mut doc, "a");
        let root = doc.root();
        assert_eq!(doc.replace(root, a), Err(TreeError::Root));
    }
}
