//! Fragment Tree
//!
//! A minimal host tree that bindings render into. It models just enough of
//! a document for propagation to work against: elements with attributes,
//! text nodes, parent links, and a connectedness test rooted at mounted
//! nodes.
//!
//! Render functions return a [`View`]; element factories accept
//! [`Renderable`] children and [`PropValue`] props, binding the reactive
//! ones through the runtime.

mod node;
mod tags;
mod view;

pub use node::{Node, NodeKind};
pub use tags::{Factory, Tags, SVG_NAMESPACE};
pub use view::{PropValue, ReadView, RenderFn, Renderable, View};
