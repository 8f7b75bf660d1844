//! Render results and child descriptions.

use std::fmt;
use std::rc::Rc;

use super::Node;
use crate::reactive::State;

/// What a render function produces.
///
/// Bindings keep nodes as-is, turn text into a text node, and treat
/// `Nothing` as a request to detach their previous output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Node(Node),
    Text(String),
    Nothing,
}

impl View {
    /// Coerce into a renderable node; `None` means "detach".
    pub fn into_node(self) -> Option<Node> {
        match self {
            View::Node(node) => Some(node),
            View::Text(text) => Some(Node::text(text)),
            View::Nothing => None,
        }
    }

    /// Textual form, used for attribute values.
    pub fn to_text(&self) -> String {
        match self {
            View::Node(node) => node.text_content(),
            View::Text(text) => text.clone(),
            View::Nothing => String::new(),
        }
    }
}

impl From<Node> for View {
    fn from(node: Node) -> Self {
        View::Node(node)
    }
}

impl From<Option<Node>> for View {
    fn from(node: Option<Node>) -> Self {
        node.map_or(View::Nothing, View::Node)
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_owned())
    }
}

impl From<()> for View {
    fn from(_: ()) -> Self {
        View::Nothing
    }
}

macro_rules! view_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for View {
                fn from(value: $ty) -> Self {
                    View::Text(value.to_string())
                }
            }
        )*
    };
}

view_from_display!(bool, char, i32, i64, u32, u64, usize, f32, f64);

/// Type-erased read access to a state, rendered as a [`View`].
pub trait ReadView {
    /// Read the current value (tracked) and convert it.
    fn read_view(&self) -> View;
}

impl<T> ReadView for State<T>
where
    T: Clone + PartialEq + Into<View> + 'static,
{
    fn read_view(&self) -> View {
        self.get().into()
    }
}

/// Render function of a binding. Receives the binding's previous output.
pub type RenderFn = Rc<dyn Fn(Option<&Node>) -> View>;

/// A child to add beneath a node.
#[derive(Clone)]
pub enum Renderable {
    /// Static content, appended once.
    Value(View),
    /// A render function, bound so it re-renders when its reads change.
    Computed(RenderFn),
    /// A state rendered through a binding on that state alone.
    CellRef(Rc<dyn ReadView>),
}

impl Renderable {
    pub fn computed<F, V>(render: F) -> Self
    where
        F: Fn(Option<&Node>) -> V + 'static,
        V: Into<View>,
    {
        Renderable::Computed(Rc::new(move |prev: Option<&Node>| render(prev).into()))
    }

    pub fn state<T>(state: &State<T>) -> Self
    where
        T: Clone + PartialEq + Into<View> + 'static,
    {
        Renderable::CellRef(Rc::new(state.clone()))
    }
}

impl From<View> for Renderable {
    fn from(view: View) -> Self {
        Renderable::Value(view)
    }
}

impl From<Node> for Renderable {
    fn from(node: Node) -> Self {
        Renderable::Value(View::Node(node))
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Renderable::Value(View::Text(text))
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Renderable::Value(View::Text(text.to_owned()))
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Value(view) => f.debug_tuple("Value").field(view).finish(),
            Renderable::Computed(_) => f.write_str("Computed(..)"),
            Renderable::CellRef(_) => f.write_str("CellRef(..)"),
        }
    }
}

/// An attribute value.
#[derive(Clone)]
pub enum PropValue {
    Value(String),
    /// Derived into a state; the attribute follows it.
    Computed(Rc<dyn Fn() -> String>),
    /// The attribute follows the state.
    CellRef(Rc<dyn ReadView>),
}

impl PropValue {
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn() -> String + 'static,
    {
        PropValue::Computed(Rc::new(compute))
    }

    pub fn state<T>(state: &State<T>) -> Self
    where
        T: Clone + PartialEq + Into<View> + 'static,
    {
        PropValue::CellRef(Rc::new(state.clone()))
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Value(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Value(value)
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PropValue::Computed(_) => f.write_str("Computed(..)"),
            PropValue::CellRef(_) => f.write_str("CellRef(..)"),
        }
    }
}
