//! Subscription Garbage Collection
//!
//! Re-running derivations and bindings leaves retired instances behind in
//! their sources' subscriber sets, and bindings whose output was removed by
//! the host stay registered until something prunes them. Commits prune the
//! sets they touch; this sweep handles the states no commit revisits.
//!
//! Every subscription marks its source state, and every derivation marks
//! its target. The first mark while no sweep is armed arms one sweep after
//! `gc_interval`; marks made before it fires join the same pool without
//! re-arming the timer.
//!
//! The pool holds states weakly and keeps them across sweeps for as long as
//! they have subscriptions, so an output the host detaches after one sweep
//! is still pruned by the next. A state drops out of the pool once it is
//! idle or gone.

use std::rc::{Rc, Weak};

use super::state::AnyState;
use super::Runtime;

impl Runtime {
    pub(crate) fn mark_for_gc(&self, state: &Rc<dyn AnyState>) {
        self.inner
            .gc_pool
            .borrow_mut()
            .entry(state.id())
            .or_insert_with(|| Rc::downgrade(state));

        if !self.inner.gc_armed.replace(true) {
            let runtime = self.downgrade();
            self.scheduler().defer_after(
                self.config().gc_interval,
                Box::new(move || {
                    if let Some(runtime) = Runtime::upgrade(&runtime) {
                        runtime.sweep();
                    }
                }),
            );
        }
    }

    /// Whether a sweep is armed.
    pub fn gc_pending(&self) -> bool {
        self.inner.gc_armed.get()
    }

    /// Prune every pooled state's subscriber sets down to live entries.
    fn sweep(&self) {
        self.inner.gc_armed.set(false);

        let pooled: Vec<Rc<dyn AnyState>> = {
            let mut pool = self.inner.gc_pool.borrow_mut();
            pool.retain(|_, state| state.strong_count() > 0);
            pool.values().filter_map(Weak::upgrade).collect()
        };

        let pruned: usize = pooled.iter().map(|state| state.sweep()).sum();
        self.inner
            .gc_pool
            .borrow_mut()
            .retain(|_, state| state.upgrade().is_some_and(|s| !s.is_idle()));

        tracing::debug!(
            states = pooled.len(),
            pruned,
            retained = self.inner.gc_pool.borrow().len(),
            "gc sweep"
        );
    }
}
