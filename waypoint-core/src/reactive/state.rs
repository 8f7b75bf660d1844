//! State Implementation
//!
//! A State is the fundamental reactive primitive. It holds a value and the
//! subscribers that must react when the value changes.
//!
//! # Values
//!
//! Each state keeps two values:
//!
//! - `raw`: the latest written value. Reads return it.
//! - `old`: the value as of the last commit. It only moves at the end of a
//!   commit, so everything running inside a commit sees the same "before".
//!
//! A write to a state nobody subscribes to moves both at once; there is
//! nothing to propagate.
//!
//! # Change Detection
//!
//! Writes compare with `PartialEq`. Types that want identity semantics
//! implement it that way ([`Node`](crate::dom::Node) does).
//!
//! # Ownership
//!
//! A derived state owns the derivations that write into it. The states a
//! derivation reads only hold it weakly, so dropping the last handle to a
//! derived state stops its derivation and frees whatever the compute
//! closure captured. Bindings are held by their sources until pruned.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::binding::Binding;
use super::runtime::RuntimeInner;
use super::subscriber::{Listener, StateId, SubscriberId};
use super::Runtime;

/// Type-erased view of a state, used by the runtime's changed sets, trackers
/// and GC pool.
pub(crate) trait AnyState {
    fn id(&self) -> StateId;

    /// `raw != old`.
    fn is_dirty(&self) -> bool;

    /// Remember the current `raw` as the value the running commit settles on.
    fn stage(&self);

    /// Move `old` to the staged value (or `raw` when nothing was staged).
    fn commit(&self);

    /// Drop dead listeners and return the survivors in registration order.
    fn live_listeners(&self) -> Vec<Rc<dyn Listener>>;

    /// Drop dead bindings and return the survivors in registration order.
    fn live_bindings(&self) -> Vec<Rc<Binding>>;

    fn add_listener(&self, listener: &Rc<dyn Listener>);

    fn add_binding(&self, binding: Rc<Binding>);

    /// Prune both subscriber sets and the dead derivations this state owns.
    /// Returns how many entries were removed.
    fn sweep(&self) -> usize;

    /// No subscribers and no owned derivations.
    fn is_idle(&self) -> bool;

    /// Drop every subscriber and owned derivation.
    fn release(&self);
}

pub(crate) struct StateInner<T> {
    id: StateId,
    raw: RefCell<T>,
    old: RefCell<T>,
    staged: RefCell<Option<T>>,
    bindings: RefCell<IndexMap<SubscriberId, Rc<Binding>>>,
    /// Sources see their listeners weakly; the target state owns them.
    listeners: RefCell<IndexMap<SubscriberId, Weak<dyn Listener>>>,
    /// Derivations writing into this state.
    derivations: RefCell<IndexMap<SubscriberId, Rc<dyn Listener>>>,
    runtime: Weak<RuntimeInner>,
}

impl<T> StateInner<T> {
    fn has_subscribers(&self) -> bool {
        !self.bindings.borrow().is_empty() || !self.listeners.borrow().is_empty()
    }

    /// Release a derivation that was replaced or retired.
    pub(crate) fn disown(&self, id: SubscriberId) {
        let released = self.derivations.borrow_mut().shift_remove(&id);
        drop(released);
    }
}

impl<T> AnyState for StateInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> StateId {
        self.id
    }

    fn is_dirty(&self) -> bool {
        *self.raw.borrow() != *self.old.borrow()
    }

    fn stage(&self) {
        *self.staged.borrow_mut() = Some(self.raw.borrow().clone());
    }

    fn commit(&self) {
        let settled = self
            .staged
            .borrow_mut()
            .take()
            .unwrap_or_else(|| self.raw.borrow().clone());
        *self.old.borrow_mut() = settled;
    }

    fn live_listeners(&self) -> Vec<Rc<dyn Listener>> {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|_, listener| listener.upgrade().is_some_and(|l| l.is_live()));
        listeners.values().filter_map(Weak::upgrade).collect()
    }

    fn live_bindings(&self) -> Vec<Rc<Binding>> {
        let mut bindings = self.bindings.borrow_mut();
        bindings.retain(|_, binding| binding.is_live());
        bindings.values().cloned().collect()
    }

    fn add_listener(&self, listener: &Rc<dyn Listener>) {
        self.listeners
            .borrow_mut()
            .insert(listener.subscriber_id(), Rc::downgrade(listener));
    }

    fn add_binding(&self, binding: Rc<Binding>) {
        self.bindings
            .borrow_mut()
            .insert(binding.subscriber_id(), binding);
    }

    fn sweep(&self) -> usize {
        let mut bindings = self.bindings.borrow_mut();
        let mut listeners = self.listeners.borrow_mut();
        let mut derivations = self.derivations.borrow_mut();
        let before = bindings.len() + listeners.len() + derivations.len();
        bindings.retain(|_, binding| binding.is_live());
        listeners.retain(|_, listener| listener.upgrade().is_some_and(|l| l.is_live()));
        derivations.retain(|_, derivation| derivation.is_live());
        before - (bindings.len() + listeners.len() + derivations.len())
    }

    fn is_idle(&self) -> bool {
        !self.has_subscribers() && self.derivations.borrow().is_empty()
    }

    fn release(&self) {
        let bindings = self.bindings.take();
        let derivations = self.derivations.take();
        self.listeners.borrow_mut().clear();
        drop((bindings, derivations));
    }
}

/// A reactive state holding a value of type `T`.
///
/// Cloning the handle shares the state.
///
/// # Example
///
/// ```rust,ignore
/// let (rt, scheduler) = Runtime::manual();
/// let step = rt.create_state(0usize);
///
/// step.set(1);          // no subscribers: applied immediately
/// assert_eq!(step.old_val(), 1);
/// ```
pub struct State<T> {
    inner: Rc<StateInner<T>>,
}

impl<T> State<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn new(runtime: Weak<RuntimeInner>, value: T) -> Self {
        Self {
            inner: Rc::new(StateInner {
                id: StateId::new(),
                raw: RefCell::new(value.clone()),
                old: RefCell::new(value),
                staged: RefCell::new(None),
                bindings: RefCell::new(IndexMap::new()),
                listeners: RefCell::new(IndexMap::new()),
                derivations: RefCell::new(IndexMap::new()),
                runtime,
            }),
        }
    }

    /// Unique identifier of this state.
    pub fn id(&self) -> StateId {
        self.inner.id
    }

    pub(crate) fn from_inner(inner: Rc<StateInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StateInner<T>> {
        Rc::downgrade(&self.inner)
    }

    /// Take ownership of a derivation writing into this state.
    pub(crate) fn own(&self, derivation: Rc<dyn Listener>) {
        self.inner
            .derivations
            .borrow_mut()
            .insert(derivation.subscriber_id(), derivation);
    }

    fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.inner.runtime)
    }

    pub(crate) fn erased(&self) -> Rc<dyn AnyState> {
        self.inner.clone()
    }

    /// Get the latest value.
    ///
    /// Inside a tracked function this registers the state as a dependency.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.runtime() {
            runtime.track_read(self.inner.id, || self.erased());
        }
        self.inner.raw.borrow().clone()
    }

    /// Get the value as of the last commit. Tracked like [`State::get`].
    pub fn old_val(&self) -> T {
        if let Some(runtime) = self.runtime() {
            runtime.track_read(self.inner.id, || self.erased());
        }
        self.inner.old.borrow().clone()
    }

    /// Get the latest value without registering a dependency.
    pub fn raw_val(&self) -> T {
        self.inner.raw.borrow().clone()
    }

    /// Write a new value.
    ///
    /// Equal writes do nothing. Otherwise subscribers are notified through
    /// the next commit; a state without subscribers settles immediately.
    pub fn set(&self, value: T) {
        let runtime = self.runtime();
        if let Some(runtime) = &runtime {
            runtime.track_write(self.inner.id);
        }

        if *self.inner.raw.borrow() == value {
            return;
        }

        match runtime {
            Some(runtime) if self.inner.has_subscribers() => {
                *self.inner.raw.borrow_mut() = value;
                runtime.enqueue_changed(self.erased());
            }
            _ => {
                *self.inner.old.borrow_mut() = value.clone();
                *self.inner.staged.borrow_mut() = None;
                *self.inner.raw.borrow_mut() = value;
            }
        }
    }

    /// Write a value computed from the latest one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.raw.borrow();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Number of registered bindings, including ones not yet pruned.
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    /// Number of registered listeners, including ones not yet pruned.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Number of derivations writing into this state.
    pub fn derivation_count(&self) -> usize {
        self.inner.derivations.borrow().len()
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for State<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Debug for State<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.inner.id)
            .field("raw", &*self.inner.raw.borrow())
            .field("old", &*self.inner.old.borrow())
            .field("bindings", &self.inner.bindings.borrow().len())
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("derivations", &self.inner.derivations.borrow().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
