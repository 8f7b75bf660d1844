//! Task Scheduling
//!
//! The reactive runtime never runs propagation inline with a write. It hands
//! two kinds of fire-and-forget callbacks to a [`Scheduler`]:
//!
//! 1. A one-shot "next tick" task that runs a commit.
//! 2. A delayed task that runs the subscription sweep.
//!
//! # Implementations
//!
//! - [`ManualScheduler`]: a host-pumped queue with a virtual clock. Nothing
//!   runs until the host calls [`ManualScheduler::run_pending`] or
//!   [`ManualScheduler::advance`]. Deterministic, so tests use it.
//!
//! - [`TokioScheduler`]: delivers tasks through `tokio::task::spawn_local`.
//!   The runtime is single-threaded (`!Send`), so it must be driven from
//!   inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Delivery of deferred work to the host's event loop.
pub trait Scheduler {
    /// Run `task` once, after the current call stack unwinds.
    fn defer(&self, task: Task);

    /// Run `task` once, no earlier than `delay` from now.
    fn defer_after(&self, delay: Duration, task: Task);
}

// ----------------------------------------------------------------------------
// Manual scheduler
// ----------------------------------------------------------------------------

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualQueue {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    tasks: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
}

/// A scheduler pumped explicitly by the host.
///
/// Cloning shares the queue, so the host keeps one handle while the runtime
/// owns another.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<ManualQueue>,
}

impl ManualScheduler {
    /// Create an empty scheduler with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.queue.now.get()
    }

    /// Number of queued one-shot tasks.
    pub fn pending_tasks(&self) -> usize {
        self.queue.tasks.borrow().len()
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.queue.timers.borrow().len()
    }

    /// Run queued one-shot tasks until the queue is empty, including tasks
    /// queued by the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs: tasks re-enter `defer`.
            let next = self.queue.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move the clock forward by `by`, firing due timers in deadline order.
    ///
    /// Pending one-shot tasks are flushed before the first timer and after
    /// each one. Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        self.run_pending();
        while let Some(timer) = self.pop_due(target) {
            self.queue.now.set(timer.due);
            (timer.task)();
            fired += 1;
            self.run_pending();
        }

        self.queue.now.set(target);
        fired
    }

    fn pop_due(&self, target: Duration) -> Option<Timer> {
        let mut timers = self.queue.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(timers.swap_remove(index))
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, task: Task) {
        self.queue.tasks.borrow_mut().push_back(task);
    }

    fn defer_after(&self, delay: Duration, task: Task) {
        let seq = self.queue.next_seq.get();
        self.queue.next_seq.set(seq + 1);
        self.queue.timers.borrow_mut().push(Timer {
            due: self.now() + delay,
            seq,
            task,
        });
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending_tasks", &self.pending_tasks())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tokio scheduler
// ----------------------------------------------------------------------------

/// A scheduler backed by the Tokio local task set.
///
/// Must be used from within `LocalSet::run_until` (or a task spawned on a
/// `LocalSet`); `spawn_local` panics anywhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }

    fn defer_after(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
