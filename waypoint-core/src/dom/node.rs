//! Fragment Nodes
//!
//! A minimal retained tree standing in for the host document. Bindings
//! produce nodes, and the garbage collector asks nodes whether they are still
//! attached to a live consumer.
//!
//! Parents own their children; a child holds a weak back-reference to its
//! parent. A node is *connected* when it, or one of its ancestors, is a
//! mounted root (see [`Node::mount_root`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

/// What a node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name and an optional namespace URI.
    Element {
        tag: String,
        namespace: Option<String>,
    },

    /// A text leaf.
    Text,
}

struct NodeInner {
    kind: NodeKind,
    /// Mounted roots are always connected.
    mounted: bool,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<SmallVec<[Node; 4]>>,
    attributes: RefCell<IndexMap<String, String>>,
    text: RefCell<String>,
}

/// A shared handle to a fragment node.
///
/// Cloning the handle does not clone the node. Equality is identity.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    fn with_kind(kind: NodeKind, mounted: bool, text: String) -> Self {
        Self(Rc::new(NodeInner {
            kind,
            mounted,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(SmallVec::new()),
            attributes: RefCell::new(IndexMap::new()),
            text: RefCell::new(text),
        }))
    }

    /// Create a detached element.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::with_kind(
            NodeKind::Element {
                tag: tag.into(),
                namespace: None,
            },
            false,
            String::new(),
        )
    }

    /// Create a detached element in the given namespace.
    pub fn element_ns(namespace: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::with_kind(
            NodeKind::Element {
                tag: tag.into(),
                namespace: Some(namespace.into()),
            },
            false,
            String::new(),
        )
    }

    /// Create a detached text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, false, content.into())
    }

    /// Create a mounted root element. Everything appended beneath it is
    /// connected.
    pub fn mount_root(tag: impl Into<String>) -> Self {
        Self::with_kind(
            NodeKind::Element {
                tag: tag.into(),
                namespace: None,
            },
            true,
            String::new(),
        )
    }

    /// What this node holds.
    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Tag name for elements, `None` for text.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text => None,
        }
    }

    /// Namespace URI for namespaced elements.
    pub fn namespace(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            NodeKind::Text => None,
        }
    }

    /// Whether this is a text leaf.
    pub fn is_text(&self) -> bool {
        matches!(self.0.kind, NodeKind::Text)
    }

    /// The current parent, if any.
    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the children, in order.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().iter().cloned().collect()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// Whether this node reaches a mounted root through its parents.
    pub fn is_connected(&self) -> bool {
        let mut current = self.0.clone();
        loop {
            if current.mounted {
                return true;
            }
            let parent = current.parent.borrow().upgrade();
            match parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if &node == self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Append `child` as the last child, moving it out of any previous parent.
    ///
    /// Text nodes take no children, and a node cannot be appended beneath
    /// itself; both requests are ignored.
    pub fn append_child(&self, child: &Node) {
        if self.is_text() || child.contains(self) {
            tracing::warn!(
                parent = ?self.tag(),
                child = ?child.tag(),
                "ignoring append that would break the tree"
            );
            return;
        }
        child.remove();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    /// Detach this node from its parent. No-op for parentless nodes.
    pub fn remove(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        parent
            .0
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(&c.0, &self.0));
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Put `replacement` where this node sits in its parent, detaching this
    /// node. No-op when this node has no parent or when both are the same node.
    pub fn replace_with(&self, replacement: &Node) {
        if self == replacement || replacement.contains(self) {
            return;
        }
        let Some(parent) = self.parent() else {
            return;
        };
        replacement.remove();

        let mut children = parent.0.children.borrow_mut();
        if let Some(index) = children.iter().position(|c| c == self) {
            children[index] = replacement.clone();
            *replacement.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
            *self.0.parent.borrow_mut() = Weak::new();
        }
    }

    /// Set or overwrite an attribute.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Current value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    /// Remove an attribute, returning its old value.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow_mut().shift_remove(name)
    }

    /// Replace the content of a text node. Ignored on elements.
    pub fn set_text(&self, content: impl Into<String>) {
        if self.is_text() {
            *self.0.text.borrow_mut() = content.into();
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if self.is_text() {
            out.push_str(&self.0.text.borrow());
            return;
        }
        for child in self.0.children.borrow().iter() {
            child.collect_text(out);
        }
    }

    /// Serialize the subtree as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &self.0.kind {
            NodeKind::Text => escape_into(&self.0.text.borrow(), out, false),
            NodeKind::Element { tag, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in self.0.attributes.borrow().iter() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, out, true);
                    out.push('"');
                }
                out.push('>');
                for child in self.0.children.borrow().iter() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(input: &str, out: &mut String, attribute: bool) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("html", &self.to_html())
            .field("connected", &self.is_connected())
            .finish()
    }
}
