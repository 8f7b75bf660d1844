//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects states,
//! derivations, and bindings. It owns the tracker stack, the changed sets,
//! the GC pool, and the scheduler used to defer work.
//!
//! # How It Works
//!
//! 1. A write to a subscribed state records the state as changed. The first
//!    such write schedules one commit; later writes join it.
//!
//! 2. The commit first runs derivations to a fixpoint (phase A): every
//!    listener of a changed state re-runs, and the states those re-runs
//!    change feed the next round. Rounds are capped so cyclic derivation
//!    graphs terminate.
//!
//! 3. Only then does it re-render bindings (phase B), so a binding never
//!    sees a half-derived set of inputs.
//!
//! 4. Finally every changed state's `old` value catches up with `raw`.
//!
//! # Ownership
//!
//! A runtime is one reactive root. It is single-threaded: states and
//! runtimes are `!Send`. States and scheduled tasks hold weak references to
//! the runtime, so dropping the last `Runtime` handle stops propagation and
//! releases every subscription the runtime was tracking.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::scheduler::{ManualScheduler, Scheduler};
use super::binding::{update, Binding};
use super::context::DependencySet;
use super::state::AnyState;
use super::subscriber::{Listener, StateId, SubscriberId};
use super::State;

/// Where the runtime is in its propagation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing pending.
    Idle,
    /// A commit is scheduled and writes are coalescing into it.
    Scheduled,
    /// A commit is running.
    Committing,
}

pub(crate) type StateSet = IndexMap<StateId, Rc<dyn AnyState>>;

#[derive(Default)]
struct Propagation {
    /// States written since the pending commit was scheduled.
    changed: Option<StateSet>,
    /// States written during the current derivation round.
    derived: Option<StateSet>,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    scheduler: Box<dyn Scheduler>,
    pub(crate) trackers: RefCell<Vec<DependencySet>>,
    /// Listeners created by the binding currently rendering, waiting for its
    /// output to anchor to.
    pub(crate) new_derives: RefCell<Option<Vec<Rc<dyn Listener>>>>,
    propagation: RefCell<Propagation>,
    /// Every state with subscriptions or owned derivations, held weakly.
    pub(crate) gc_pool: RefCell<IndexMap<StateId, Weak<dyn AnyState>>>,
    pub(crate) gc_armed: Cell<bool>,
    committing: Cell<bool>,
}

impl Drop for RuntimeInner {
    /// Subscriptions cannot fire without the runtime. Releasing them breaks
    /// the reference cycles between states and the closures they feed.
    fn drop(&mut self) {
        let states: Vec<_> = self
            .gc_pool
            .get_mut()
            .drain(..)
            .filter_map(|(_, state)| state.upgrade())
            .collect();
        for state in &states {
            state.release();
        }
        tracing::debug!(states = states.len(), "runtime dropped; subscriptions released");
    }
}

/// Handle to a reactive root.
///
/// Cloning the handle shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new<S>(scheduler: S) -> Self
    where
        S: Scheduler + 'static,
    {
        Self::build(RuntimeConfig::default(), Box::new(scheduler))
    }

    /// Create a runtime with a validated configuration.
    pub fn with_config<S>(config: RuntimeConfig, scheduler: S) -> Result<Self>
    where
        S: Scheduler + 'static,
    {
        config.validate()?;
        Ok(Self::build(config, Box::new(scheduler)))
    }

    /// Create a runtime driven by a [`ManualScheduler`], returning the
    /// host's handle to the scheduler.
    pub fn manual() -> (Self, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        (Self::new(scheduler.clone()), scheduler)
    }

    fn build(config: RuntimeConfig, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                scheduler,
                trackers: RefCell::new(Vec::new()),
                new_derives: RefCell::new(None),
                propagation: RefCell::new(Propagation::default()),
                gc_pool: RefCell::new(IndexMap::new()),
                gc_armed: Cell::new(false),
                committing: Cell::new(false),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<RuntimeInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn scheduler(&self) -> &dyn Scheduler {
        self.inner.scheduler.as_ref()
    }

    /// Create a state owned by this runtime.
    pub fn create_state<T>(&self, initial: T) -> State<T>
    where
        T: Clone + PartialEq + 'static,
    {
        State::new(self.downgrade(), initial)
    }

    /// Where the runtime is in its propagation cycle.
    pub fn phase(&self) -> Phase {
        if self.inner.committing.get() {
            Phase::Committing
        } else if self.inner.propagation.borrow().changed.is_some() {
            Phase::Scheduled
        } else {
            Phase::Idle
        }
    }

    /// Record a subscribed state as changed, scheduling a commit if none is
    /// pending.
    pub(crate) fn enqueue_changed(&self, state: Rc<dyn AnyState>) {
        let id = state.id();
        let schedule = {
            let mut propagation = self.inner.propagation.borrow_mut();
            if let Some(derived) = propagation.derived.as_mut() {
                derived.insert(id, Rc::clone(&state));
            }
            match propagation.changed.as_mut() {
                Some(changed) => {
                    changed.insert(id, state);
                    false
                }
                None => {
                    propagation.changed = Some(IndexMap::from([(id, state)]));
                    true
                }
            }
        };

        if schedule {
            let runtime = self.downgrade();
            self.scheduler().defer(Box::new(move || {
                if let Some(runtime) = Runtime::upgrade(&runtime) {
                    runtime.commit();
                }
            }));
        }
    }

    /// Run one propagation cycle over everything written since it was
    /// scheduled.
    fn commit(&self) {
        let Some(pending) = self.inner.propagation.borrow().changed.as_ref().map(|changed| {
            changed.values().cloned().collect::<Vec<_>>()
        }) else {
            return;
        };

        self.inner.committing.set(true);
        tracing::debug!(changed = pending.len(), "commit started");

        let rounds = self.stabilize_derivations(pending);
        let refreshed = self.refresh_bindings();

        self.inner.committing.set(false);
        tracing::debug!(rounds, bindings = refreshed, "commit finished");
    }

    /// Phase A. Returns the number of rounds run.
    fn stabilize_derivations(&self, pending: Vec<Rc<dyn AnyState>>) -> usize {
        let cap = self.inner.config.max_fixpoint_rounds;
        let mut frontier: Vec<_> = pending.into_iter().filter(|s| s.is_dirty()).collect();
        let mut rounds = 0;

        loop {
            self.inner.propagation.borrow_mut().derived = Some(IndexMap::new());

            let mut listeners: IndexMap<SubscriberId, Rc<dyn Listener>> = IndexMap::new();
            for state in &frontier {
                for listener in state.live_listeners() {
                    listeners.entry(listener.subscriber_id()).or_insert(listener);
                }
            }
            tracing::trace!(
                round = rounds,
                states = frontier.len(),
                listeners = listeners.len(),
                "derivation round"
            );

            for listener in listeners.into_values() {
                listener.rerun(self);
                listener.retire();
            }
            rounds += 1;

            frontier = self
                .inner
                .propagation
                .borrow_mut()
                .derived
                .take()
                .map(|derived| derived.into_values().collect())
                .unwrap_or_default();

            if frontier.is_empty() {
                break;
            }
            if rounds >= cap {
                tracing::warn!(
                    rounds,
                    unsettled = frontier.len(),
                    "derivations did not settle; truncating propagation at the round cap"
                );
                break;
            }
        }

        rounds
    }

    /// Phase B. Returns the number of bindings re-rendered.
    fn refresh_bindings(&self) -> usize {
        let changed: Vec<_> = self
            .inner
            .propagation
            .borrow_mut()
            .changed
            .take()
            .map(|changed| changed.into_values().filter(|s| s.is_dirty()).collect())
            .unwrap_or_default();

        // Pin the value this commit settles on; writes made while bindings
        // render belong to the next commit.
        for state in &changed {
            state.stage();
        }

        let mut bindings: IndexMap<SubscriberId, Rc<Binding>> = IndexMap::new();
        for state in &changed {
            for binding in state.live_bindings() {
                bindings.entry(binding.subscriber_id()).or_insert(binding);
            }
        }

        let refreshed = bindings.len();
        for binding in bindings.into_values() {
            let previous = binding.output();
            let output = self.bind_render(binding.render(), previous.clone());
            if let Some(previous) = &previous {
                update(previous, output.as_ref());
            }
            binding.retire();
        }

        for state in &changed {
            state.commit();
        }
        refreshed
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("phase", &self.phase())
            .field("gc_pending", &self.gc_pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::dom::Node;
    use crate::Error;

    #[test]
    fn runtime_starts_idle() {
        let (rt, scheduler) = Runtime::manual();
        assert_eq!(rt.phase(), Phase::Idle);
        assert_eq!(scheduler.pending_tasks(), 0);
        assert!(!rt.gc_pending());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RuntimeConfig::default().with_max_fixpoint_rounds(0);
        let err = Runtime::with_config(config, ManualScheduler::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn writes_coalesce_into_one_commit() {
        let (rt, scheduler) = Runtime::manual();
        let a = rt.create_state(0);
        let b = rt.create_state(0);
        let runs = Rc::new(Cell::new(0));
        let _sum = rt.derive({
            let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                a.get() + b.get()
            }
        });

        a.set(1);
        b.set(2);
        a.set(3);
        assert_eq!(scheduler.pending_tasks(), 1);
        assert_eq!(rt.phase(), Phase::Scheduled);

        assert_eq!(scheduler.run_pending(), 1);
        // The listener is shared by both sources, so it ran once.
        assert_eq!(runs.get(), 2);
        assert_eq!(rt.phase(), Phase::Idle);
    }

    #[test]
    fn write_then_revert_is_not_propagated() {
        let (rt, scheduler) = Runtime::manual();
        let a = rt.create_state(1);
        let runs = Rc::new(Cell::new(0));
        let _copy = rt.derive({
            let (a, runs) = (a.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                a.get()
            }
        });

        a.set(2);
        a.set(1);
        scheduler.run_pending();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn chained_derivations_settle_in_one_commit() {
        let (rt, scheduler) = Runtime::manual();
        let a = rt.create_state(1);
        let b = rt.derive({
            let a = a.clone();
            move || a.get() + 1
        });
        let c = rt.derive({
            let b = b.clone();
            move || b.get() * 10
        });

        a.set(5);
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(b.raw_val(), 6);
        assert_eq!(c.raw_val(), 60);
        assert_eq!(c.old_val(), 60);
    }

    #[test]
    fn cyclic_derivations_stop_at_the_cap() {
        let config = RuntimeConfig::default().with_max_fixpoint_rounds(5);
        let scheduler = ManualScheduler::new();
        let rt = Runtime::with_config(config, scheduler.clone()).unwrap();
        let b = rt.create_state(0i32);
        let c = rt.create_state(0i32);
        let b_runs = Rc::new(Cell::new(0));

        rt.derive_into(&b, {
            let (c, b_runs) = (c.clone(), b_runs.clone());
            move || {
                b_runs.set(b_runs.get() + 1);
                c.get() + 1
            }
        });
        rt.derive_into(&c, {
            let b = b.clone();
            move || b.get() + 1
        });

        b.set(100);
        assert_eq!(scheduler.run_pending(), 1);

        // One run on creation plus one per round.
        assert_eq!(b_runs.get(), 6);
        assert_eq!((b.raw_val() - c.raw_val()).abs(), 1);
        assert_eq!(rt.phase(), Phase::Idle);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn bindings_see_only_settled_values() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let step = rt.create_state(0usize);
        let total = 3usize;
        let label = rt.derive({
            let step = step.clone();
            move || format!("{}/{}", step.get() + 1, total)
        });
        let seen = Rc::new(RefCell::new(Vec::new()));

        let output = rt
            .bind({
                let (step, label, seen) = (step.clone(), label.clone(), seen.clone());
                move |_| {
                    let text = format!("{} {}", step.get(), label.get());
                    seen.borrow_mut().push(text.clone());
                    text
                }
            })
            .unwrap();
        root.append_child(&output);

        step.set(1);
        scheduler.run_pending();

        assert_eq!(*seen.borrow(), vec!["0 1/3", "1 2/3"]);
    }

    #[test]
    fn old_values_are_stable_during_a_commit() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let step = rt.create_state(0);

        let output = rt
            .bind({
                let step = step.clone();
                move |_| format!("{}->{}", step.old_val(), step.get())
            })
            .unwrap();
        root.append_child(&output);
        assert_eq!(root.text_content(), "0->0");

        step.set(4);
        scheduler.run_pending();
        assert_eq!(root.text_content(), "0->4");
        assert_eq!(step.old_val(), 4);
    }

    #[test]
    fn writes_from_bindings_defer_to_next_commit() {
        let (rt, scheduler) = Runtime::manual();
        let root = Node::mount_root("body");
        let step = rt.create_state(0);
        let renders = rt.create_state(0);
        let mirror = rt.derive({
            let renders = renders.clone();
            move || renders.get()
        });

        let output = rt
            .bind({
                let (step, renders) = (step.clone(), renders.clone());
                move |_| {
                    let step = step.get();
                    renders.update(|n| n + 1);
                    step
                }
            })
            .unwrap();
        root.append_child(&output);
        scheduler.run_pending();
        assert_eq!(mirror.raw_val(), 1);

        step.set(1);
        assert_eq!(scheduler.run_pending(), 2);
        assert_eq!(renders.raw_val(), 2);
        assert_eq!(mirror.raw_val(), 2);
        assert_eq!(rt.phase(), Phase::Idle);
    }

    #[test]
    fn dropping_the_runtime_cancels_pending_commit() {
        let (rt, scheduler) = Runtime::manual();
        let a = rt.create_state(1);
        let b = rt.derive({
            let a = a.clone();
            move || a.get() * 2
        });

        a.set(2);
        drop(rt);
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(b.raw_val(), 2);
    }
}
