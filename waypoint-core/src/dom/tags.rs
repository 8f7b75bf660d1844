//! Element Factories
//!
//! Collaborators build fragments through a registry of factories keyed by
//! tag name. A factory validates its tag once; building an element applies
//! props and children, binding the reactive ones.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{Node, PropValue, Renderable};
use crate::error::{Error, Result};
use crate::reactive::Runtime;

/// Namespace URI for SVG elements.
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

fn validate_tag(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        && name.starts_with(|c: char| c.is_ascii_alphabetic());
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidTagName(name.to_owned()))
    }
}

/// Builds elements of one tag.
#[derive(Clone)]
pub struct Factory {
    runtime: Runtime,
    tag: Rc<str>,
    namespace: Option<Rc<str>>,
}

impl Factory {
    /// Tag name of the elements this factory builds.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Namespace the elements are created in, `None` for HTML.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Build an element with no props or children.
    pub fn empty(&self) -> Node {
        match &self.namespace {
            Some(ns) => Node::element_ns(ns.as_ref(), self.tag.as_ref()),
            None => Node::element(self.tag.as_ref()),
        }
    }

    /// Build an element, applying `props` in order and appending `children`.
    pub fn build<K, P, C>(&self, props: P, children: C) -> Node
    where
        K: Into<String>,
        P: IntoIterator<Item = (K, PropValue)>,
        C: IntoIterator<Item = Renderable>,
    {
        let node = self.empty();
        for (name, value) in props {
            self.runtime.apply_prop(&node, name.into(), value);
        }
        self.runtime.add(&node, children);
        node
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("tag", &self.tag)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Registry of element factories for one runtime and namespace.
pub struct Tags {
    runtime: Runtime,
    namespace: Option<Rc<str>>,
    factories: RefCell<IndexMap<String, Factory>>,
}

impl Tags {
    /// Factories for plain (HTML) elements.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            namespace: None,
            factories: RefCell::new(IndexMap::new()),
        }
    }

    /// Factories for elements in `namespace`.
    pub fn with_namespace(runtime: &Runtime, namespace: impl Into<String>) -> Self {
        Self {
            runtime: runtime.clone(),
            namespace: Some(Rc::from(namespace.into())),
            factories: RefCell::new(IndexMap::new()),
        }
    }

    /// Look up or create the factory for `name`.
    pub fn factory(&self, name: &str) -> Result<Factory> {
        if let Some(factory) = self.factories.borrow().get(name) {
            return Ok(factory.clone());
        }

        validate_tag(name)?;
        let factory = Factory {
            runtime: self.runtime.clone(),
            tag: Rc::from(name),
            namespace: self.namespace.clone(),
        };
        self.factories
            .borrow_mut()
            .insert(name.to_owned(), factory.clone());
        Ok(factory)
    }

    /// Number of factories created so far.
    pub fn len(&self) -> usize {
        self.factories.borrow().len()
    }

    /// Whether no factory has been created yet.
    pub fn is_empty(&self) -> bool {
        self.factories.borrow().is_empty()
    }
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tags")
            .field("namespace", &self.namespace)
            .field("factories", &self.factories.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Runtime {
    /// Append `children` to `parent`, binding computed and state children.
    pub fn add<C>(&self, parent: &Node, children: C) -> Node
    where
        C: IntoIterator<Item = Renderable>,
    {
        for child in children {
            let node = match child {
                Renderable::Value(view) => view.into_node(),
                Renderable::Computed(render) => self.bind_render(render, None),
                Renderable::CellRef(state) => {
                    self.bind_render(Rc::new(move |_: Option<&Node>| state.read_view()), None)
                }
            };
            if let Some(node) = node {
                parent.append_child(&node);
            }
        }
        parent.clone()
    }

    /// Set attribute `name` on `node`, keeping it in sync for reactive
    /// values.
    ///
    /// The sync binding is anchored on `node` itself, so it dies when the
    /// node is removed from the tree.
    pub(crate) fn apply_prop(&self, node: &Node, name: String, value: PropValue) {
        match value {
            PropValue::Value(value) => node.set_attribute(name, value),
            PropValue::Computed(compute) => {
                let derived = self.derive(move || compute());
                let target = node.clone();
                self.bind_render(
                    Rc::new(move |_: Option<&Node>| {
                        target.set_attribute(name.clone(), derived.get());
                        target.clone().into()
                    }),
                    None,
                );
            }
            PropValue::CellRef(state) => {
                let target = node.clone();
                self.bind_render(
                    Rc::new(move |_: Option<&Node>| {
                        target.set_attribute(name.clone(), state.read_view().to_text());
                        target.clone().into()
                    }),
                    None,
                );
            }
        }
    }
}
