//! Derivation Implementation
//!
//! A derivation is a state whose value is computed from other states. It
//! is eager: the value is computed on creation and recomputed by the commit
//! whenever a state it read changes.
//!
//! # How Derivations Work
//!
//! 1. The compute function runs under the tracker and its result is written
//!    into the target state like any other write.
//!
//! 2. The derivation registers a listener on every state it read (and did
//!    not also write).
//!
//! 3. When one of those states changes, the commit re-runs the derivation as
//!    a fresh listener and retires the old one. Re-running with unchanged
//!    inputs writes an equal value, which is a no-op.
//!
//! # Anchors
//!
//! A derivation created while a binding renders belongs to that binding and
//! dies when the binding is retired or its output leaves the tree. When the
//! render read no state the binding never re-renders, and the derivation
//! follows the output node instead. One
//! created outside any binding lives as long as its target state: the
//! target owns it, and the states it reads only hold it weakly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::state::StateInner;
use super::subscriber::{Anchor, Listener, SubscriberId};
use super::{Runtime, State};

struct Derivation<T> {
    id: SubscriberId,
    compute: Rc<dyn Fn() -> T>,
    /// The target owns this derivation, not the other way round.
    target: Weak<StateInner<T>>,
    anchor: RefCell<Anchor>,
}

impl<T> Listener for Derivation<T>
where
    T: Clone + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn is_live(&self) -> bool {
        self.anchor.borrow().is_live()
    }

    fn anchor(&self) -> Anchor {
        self.anchor.borrow().clone()
    }

    fn set_anchor(&self, anchor: Anchor) {
        *self.anchor.borrow_mut() = anchor;
    }

    fn rerun(&self, runtime: &Runtime) {
        if let Some(target) = self.target.upgrade() {
            runtime.derive_with(
                Rc::clone(&self.compute),
                State::from_inner(target),
                Some(self.anchor()),
            );
        }
    }

    fn retire(&self) {
        self.set_anchor(Anchor::Retired);
        if let Some(target) = self.target.upgrade() {
            target.disown(self.id);
        }
    }
}

impl Runtime {
    /// Create a derived state.
    ///
    /// The state starts at `T::default()` and immediately takes the computed
    /// value; it keeps the default only if the first computation fails.
    ///
    /// The returned state owns the derivation. Once every handle to it is
    /// dropped the derivation stops running.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let step = rt.create_state(0usize);
    /// let is_last = rt.derive({
    ///     let step = step.clone();
    ///     move || step.get() + 1 == total_steps
    /// });
    /// ```
    pub fn derive<T, F>(&self, compute: F) -> State<T>
    where
        T: Clone + PartialEq + Default + 'static,
        F: Fn() -> T + 'static,
    {
        let target = self.create_state(T::default());
        self.derive_with(Rc::new(compute), target, None)
    }

    /// Derive into an existing state, which takes ownership of the
    /// derivation.
    pub fn derive_into<T, F>(&self, target: &State<T>, compute: F) -> State<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        self.derive_with(Rc::new(compute), target.clone(), None)
    }

    /// `anchor` is `Some` when re-running an existing listener.
    pub(crate) fn derive_with<T>(
        &self,
        compute: Rc<dyn Fn() -> T>,
        target: State<T>,
        anchor: Option<Anchor>,
    ) -> State<T>
    where
        T: Clone + PartialEq + 'static,
    {
        let listener: Rc<dyn Listener> = Rc::new(Derivation {
            id: SubscriberId::new(),
            compute: Rc::clone(&compute),
            target: target.downgrade(),
            anchor: RefCell::new(Anchor::Always),
        });

        let anchor = anchor.unwrap_or_else(|| {
            match self.inner.new_derives.borrow_mut().as_mut() {
                Some(pending) => {
                    pending.push(listener.clone());
                    Anchor::Pending
                }
                None => Anchor::Always,
            }
        });
        listener.set_anchor(anchor);
        target.own(Rc::clone(&listener));
        self.mark_for_gc(&target.erased());

        let (value, deps) = self.capture_deps(move |_| compute(), target.raw_val());
        target.set(value);

        for state in deps.subscribable() {
            self.mark_for_gc(&state);
            state.add_listener(&listener);
        }

        target
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
