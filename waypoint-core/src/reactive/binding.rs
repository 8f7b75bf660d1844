//! Binding Implementation
//!
//! A Binding ties a render function to the fragment it produced. When a
//! state the render function read changes, the commit re-runs it and swaps
//! the new fragment in place of the old one.
//!
//! # Lifecycle
//!
//! 1. `bind` runs the render function under the tracker, subscribes to every
//!    state it read, and records the output.
//!
//! 2. On re-render the commit creates a *new* binding from the same render
//!    function, patches the output with [`update`], and retires the old
//!    binding. Derivations created by the old binding's render die with it.
//!
//! 3. A binding whose output is no longer connected is dead. Sources drop it
//!    the next time they prune (during a commit or a GC sweep).
//!
//! Rendering `Nothing` detaches the output; that is terminal for the binding.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::{Node, RenderFn, View};
use super::subscriber::{Anchor, Listener, SubscriberId};
use super::Runtime;

pub(crate) struct Binding {
    id: SubscriberId,
    render: RenderFn,
    output: RefCell<Option<Node>>,
}

impl Binding {
    pub(crate) fn new(render: RenderFn, output: Option<Node>) -> Rc<Self> {
        Rc::new(Self {
            id: SubscriberId::new(),
            render,
            output: RefCell::new(output),
        })
    }

    pub(crate) fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn render(&self) -> RenderFn {
        Rc::clone(&self.render)
    }

    pub(crate) fn output(&self) -> Option<Node> {
        self.output.borrow().clone()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.output
            .borrow()
            .as_ref()
            .is_some_and(Node::is_connected)
    }

    /// Drop the output. Derivations created by this binding's render die
    /// with it, even when a newer binding kept the same output node.
    pub(crate) fn retire(&self) {
        *self.output.borrow_mut() = None;
    }
}

/// Patch `old` in its parent with the result of a re-render.
///
/// A different node replaces `old`; the same node is left alone; `None`
/// detaches `old`.
pub fn update(old: &Node, new: Option<&Node>) {
    match new {
        Some(new) if new != old => old.replace_with(new),
        Some(_) => {}
        None => old.remove(),
    }
}

impl Runtime {
    /// Bind a render function and return its output.
    ///
    /// The render function receives its previous output (`None` on the
    /// first run). Returning text produces a text node; returning
    /// [`View::Nothing`] produces no output.
    ///
    /// The output is returned detached; the caller places it. Bindings whose
    /// output is not connected when a commit reaches them are dropped.
    pub fn bind<F, V>(&self, render: F) -> Option<Node>
    where
        F: Fn(Option<&Node>) -> V + 'static,
        V: Into<View>,
    {
        self.bind_render(Rc::new(move |prev: Option<&Node>| render(prev).into()), None)
    }

    /// Bind a render function against an existing node and patch the node
    /// with the first result.
    pub fn hydrate<F, V>(&self, node: &Node, render: F) -> Option<Node>
    where
        F: Fn(Option<&Node>) -> V + 'static,
        V: Into<View>,
    {
        let output = self.bind_render(
            Rc::new(move |prev: Option<&Node>| render(prev).into()),
            Some(node.clone()),
        );
        update(node, output.as_ref());
        output
    }

    pub(crate) fn bind_render(&self, render: RenderFn, previous: Option<Node>) -> Option<Node> {
        let outer_derives = self.inner.new_derives.replace(Some(Vec::new()));

        let run = Rc::clone(&render);
        let (output, deps) =
            self.capture_deps(move |prev: Option<Node>| run(prev.as_ref()).into_node(), previous);

        let binding = Binding::new(render, output.clone());
        let sources: Vec<_> = deps.subscribable().collect();
        for state in &sources {
            self.mark_for_gc(state);
            state.add_binding(Rc::clone(&binding));
        }

        let created: Vec<Rc<dyn Listener>> = self
            .inner
            .new_derives
            .replace(outer_derives)
            .unwrap_or_default();
        let anchor = match &output {
            Some(node) if sources.is_empty() => Anchor::Output(node.clone()),
            Some(_) => Anchor::Owned(Rc::downgrade(&binding)),
            None => Anchor::Retired,
        };
        for listener in created {
            listener.set_anchor(anchor.clone());
        }

        output
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn bind_renders_immediately() {
        let (rt, _scheduler) = Runtime::manual();
        let count = rt.create_state(3);

        let output = rt
            .bind({
                let count = count.clone();
                move |_| format!("count: {}", count.get())
            })
            .unwrap();

        assert!(output.is_text());
        assert_eq!(output.text_content(), "count: 3");
        assert_eq!(count.binding_count(), 1);
    }

    #[test]
    fn bind_rerenders_after_commit() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let count = rt.create_state(1);
        let renders = Rc::new(Cell::new(0));

        let output = rt
            .bind({
                let count = count.clone();
                let renders = renders.clone();
                move |_| {
                    renders.set(renders.get() + 1);
                    count.get()
                }
            })
            .unwrap();
        root.append_child(&output);

        count.set(2);
        assert_eq!(renders.get(), 1);
        scheduler.run_pending();

        assert_eq!(renders.get(), 2);
        assert_eq!(root.text_content(), "2");
        assert!(!output.is_connected());
    }

    #[test]
    fn previous_output_is_passed_back() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let label = rt.create_state(String::from("a"));

        let output = rt
            .bind({
                let label = label.clone();
                move |prev| {
                    let node = prev.cloned().unwrap_or_else(|| Node::element("span"));
                    node.set_attribute("data-label", label.get());
                    node
                }
            })
            .unwrap();
        root.append_child(&output);

        label.set("b".into());
        scheduler.run_pending();

        // Same node reused, so nothing was replaced.
        assert_eq!(root.children(), vec![output.clone()]);
        assert_eq!(output.attribute("data-label").as_deref(), Some("b"));
    }

    #[test]
    fn nothing_detaches_output() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let visible = rt.create_state(true);

        let output = rt
            .bind({
                let visible = visible.clone();
                move |_| {
                    if visible.get() {
                        View::Text("hint".into())
                    } else {
                        View::Nothing
                    }
                }
            })
            .unwrap();
        root.append_child(&output);

        visible.set(false);
        scheduler.run_pending();

        assert_eq!(root.child_count(), 0);
        assert!(!output.is_connected());

        // Detachment is terminal: nothing listens any more.
        visible.set(true);
        scheduler.run_pending();
        assert_eq!(root.child_count(), 0);
        assert_eq!(visible.binding_count(), 0);
    }

    #[test]
    fn failed_render_keeps_previous_output() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let step = rt.create_state(0);

        let output = rt
            .bind({
                let step = step.clone();
                move |_| {
                    let step = step.get();
                    if step == 1 {
                        panic!("no tooltip for step {step}");
                    }
                    format!("step {step}")
                }
            })
            .unwrap();
        root.append_child(&output);

        step.set(1);
        scheduler.run_pending();
        assert_eq!(root.children(), vec![output.clone()]);
        assert_eq!(root.text_content(), "step 0");

        // The failed run still subscribed, so the next change recovers.
        step.set(2);
        scheduler.run_pending();
        assert_eq!(root.text_content(), "step 2");
    }

    #[test]
    fn hydrate_replaces_existing_node() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let placeholder = Node::element("div");
        root.append_child(&placeholder);
        let title = rt.create_state(String::from("Welcome"));

        let output = rt
            .hydrate(&placeholder, {
                let title = title.clone();
                move |_| {
                    let h = Node::element("h1");
                    h.append_child(&Node::text(title.get()));
                    h
                }
            })
            .unwrap();

        assert!(!placeholder.is_connected());
        assert_eq!(root.children(), vec![output]);

        title.set("Step 2".into());
        scheduler.run_pending();
        assert_eq!(root.to_html(), "<body><h1>Step 2</h1></body>");
    }

    #[test]
    fn update_patches_in_place() {
        let root = Node::mount_root("body");
        let old = Node::text("old");
        root.append_child(&old);

        update(&old, Some(&old));
        assert_eq!(root.children(), vec![old.clone()]);

        let new = Node::text("new");
        update(&old, Some(&new));
        assert_eq!(root.children(), vec![new.clone()]);

        update(&new, None);
        assert_eq!(root.child_count(), 0);
    }
}
