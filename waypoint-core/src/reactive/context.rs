//! Dependency Tracking
//!
//! The tracker records which states a function reads and writes while it
//! runs. Derivations and bindings use the result to subscribe themselves.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of dependency sets. Entering a tracked
//! function pushes a fresh set; reads and writes land in the top set; leaving
//! pops it. Nested tracked functions (a derivation created inside a binding)
//! therefore see only their own reads.
//!
//! A state that is both read and written during one invocation is not
//! subscribed to: a derivation that writes what it reads would otherwise
//! trigger itself.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::error::CaptureError;
use super::state::AnyState;
use super::subscriber::StateId;
use super::Runtime;

/// States touched during one tracked invocation, in first-touch order.
#[derive(Default)]
pub(crate) struct DependencySet {
    getters: IndexMap<StateId, Rc<dyn AnyState>>,
    setters: IndexSet<StateId>,
}

impl DependencySet {
    /// States read but not written.
    pub(crate) fn subscribable(self) -> impl Iterator<Item = Rc<dyn AnyState>> {
        let setters = self.setters;
        self.getters
            .into_iter()
            .filter(move |(id, _)| !setters.contains(id))
            .map(|(_, state)| state)
    }

    #[cfg(test)]
    fn getter_ids(&self) -> Vec<StateId> {
        self.getters.keys().copied().collect()
    }
}

/// Guard for one tracking frame.
///
/// Dropping it without calling [`TrackingScope::finish`] still pops the
/// frame, so the stack stays balanced on every exit path.
struct TrackingScope<'a> {
    frames: &'a RefCell<Vec<DependencySet>>,
    depth: usize,
    finished: bool,
}

impl<'a> TrackingScope<'a> {
    fn enter(frames: &'a RefCell<Vec<DependencySet>>) -> Self {
        let mut stack = frames.borrow_mut();
        stack.push(DependencySet::default());
        let depth = stack.len();
        Self {
            frames,
            depth,
            finished: false,
        }
    }

    fn finish(mut self) -> DependencySet {
        self.finished = true;
        let mut stack = self.frames.borrow_mut();
        debug_assert_eq!(
            stack.len(),
            self.depth,
            "tracking frame mismatch: expected depth {}, found {}",
            self.depth,
            stack.len()
        );
        stack.pop().unwrap_or_default()
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.frames.borrow_mut().truncate(self.depth - 1);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl Runtime {
    /// Run `f(arg)` with dependency tracking and return its result.
    ///
    /// A panic inside `f` is caught and logged, and `arg` is returned in
    /// place of the result. Callers pass the value they would fall back to
    /// (a derivation's current value, a binding's current output), which
    /// turns a failing render into a no-op.
    pub fn capture<T, F>(&self, f: F, arg: T) -> T
    where
        T: Clone,
        F: FnOnce(T) -> T,
    {
        self.capture_deps(f, arg).0
    }

    pub(crate) fn capture_deps<T, F>(&self, f: F, arg: T) -> (T, DependencySet)
    where
        T: Clone,
        F: FnOnce(T) -> T,
    {
        let fallback = arg.clone();
        let scope = TrackingScope::enter(&self.inner.trackers);
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || f(arg)))
            .map_err(|payload| CaptureError::Panicked(panic_message(payload.as_ref())));
        let deps = scope.finish();

        match outcome {
            Ok(value) => (value, deps),
            Err(error) => {
                tracing::error!(%error, "tracked function failed; keeping previous value");
                (fallback, deps)
            }
        }
    }

    /// Whether a tracked function is running.
    pub fn is_tracking(&self) -> bool {
        !self.inner.trackers.borrow().is_empty()
    }

    pub(crate) fn track_read<F>(&self, id: StateId, erased: F)
    where
        F: FnOnce() -> Rc<dyn AnyState>,
    {
        if let Some(frame) = self.inner.trackers.borrow_mut().last_mut() {
            frame.getters.entry(id).or_insert_with(erased);
        }
    }

    pub(crate) fn track_write(&self, id: StateId) {
        if let Some(frame) = self.inner.trackers.borrow_mut().last_mut() {
            frame.setters.insert(id);
        }
    }
}
