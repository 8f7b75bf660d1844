//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a state notifies on change: derivations
//! (listeners) and bindings. Subscribers are never mutated in place; a
//! re-run creates a fresh subscriber and retires the old one, and retired
//! subscribers are dropped the next time their source prunes its sets.

use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dom::Node;
use super::binding::Binding;
use super::Runtime;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

/// What keeps a listener alive.
#[derive(Clone)]
pub(crate) enum Anchor {
    /// Created outside any binding; lives as long as its target state.
    Always,
    /// Created inside a binding that has not finished rendering yet.
    Pending,
    /// Created by a binding's render; dies when that binding is retired or
    /// its output leaves the tree.
    Owned(Weak<Binding>),
    /// Created by a render that read no state. Nothing holds such a binding,
    /// so the derivation follows the output node instead.
    Output(Node),
    /// Replaced by a newer instance, or its owning binding produced nothing.
    Retired,
}

impl Anchor {
    pub(crate) fn is_live(&self) -> bool {
        match self {
            Anchor::Always => true,
            Anchor::Owned(binding) => binding.upgrade().is_some_and(|b| b.is_live()),
            Anchor::Output(node) => node.is_connected(),
            Anchor::Pending | Anchor::Retired => false,
        }
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Always => f.write_str("Always"),
            Anchor::Pending => f.write_str("Pending"),
            Anchor::Owned(binding) => f
                .debug_tuple("Owned")
                .field(&binding.upgrade().map(|b| b.subscriber_id()))
                .finish(),
            Anchor::Output(node) => f.debug_tuple("Output").field(node).finish(),
            Anchor::Retired => f.write_str("Retired"),
        }
    }
}

/// A derivation registered on the states it reads.
///
/// Type-erased over the derivation's value type so a state can hold
/// listeners of any target type.
pub(crate) trait Listener {
    fn subscriber_id(&self) -> SubscriberId;

    /// Whether the listener's anchor is still live.
    fn is_live(&self) -> bool;

    fn anchor(&self) -> Anchor;

    fn set_anchor(&self, anchor: Anchor);

    /// Re-run the derivation as a fresh listener inheriting this one's anchor.
    fn rerun(&self, runtime: &Runtime);

    /// Mark this instance dead and release whatever owns it.
    fn retire(&self) {
        self.set_anchor(Anchor::Retired);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::dom::View;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn anchor_liveness() {
        assert!(Anchor::Always.is_live());
        assert!(!Anchor::Pending.is_live());
        assert!(!Anchor::Retired.is_live());
    }

    #[test]
    fn owned_anchor_follows_its_binding() {
        let root = Node::mount_root("body");
        let div = Node::element("div");
        let binding = Binding::new(Rc::new(|_: Option<&Node>| View::Nothing), Some(div.clone()));
        let anchor = Anchor::Owned(Rc::downgrade(&binding));
        assert!(!anchor.is_live());

        root.append_child(&div);
        assert!(anchor.is_live());

        // Retiring the binding kills the anchor even though the node it
        // rendered is still in the tree.
        binding.retire();
        assert!(div.is_connected());
        assert!(!anchor.is_live());

        let other = Binding::new(Rc::new(|_: Option<&Node>| View::Nothing), Some(div.clone()));
        let anchor = Anchor::Owned(Rc::downgrade(&other));
        drop(other);
        assert!(!anchor.is_live());
    }

    #[test]
    fn output_anchor_follows_its_node() {
        let root = Node::mount_root("body");
        let div = Node::element("div");
        let anchor = Anchor::Output(div.clone());
        assert!(!anchor.is_live());

        root.append_child(&div);
        assert!(anchor.is_live());

        div.remove();
        assert!(!anchor.is_live());
    }
}
