//! Waypoint Core
//!
//! This crate provides the reactive state-propagation engine behind the
//! Waypoint guided-tour widgets. It implements:
//!
//! - Mutable states with automatic dependency tracking
//! - Derived states, re-run to a fixpoint inside each commit
//! - Bindings that re-render fragments of a host tree in place
//! - A batched commit scheduler and a debounced subscription sweep
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: States, derivations, bindings, and the runtime that
//!   commits them
//! - `dom`: The fragment tree bindings render into, plus element factories
//! - `scheduler`: Deferred task execution (manual or Tokio-backed)
//! - `config`: Runtime tuning knobs
//!
//! # Example
//!
//! ```rust
//! use waypoint_core::dom::Node;
//! use waypoint_core::Runtime;
//!
//! let (rt, scheduler) = Runtime::manual();
//! let root = Node::mount_root("body");
//!
//! let step = rt.create_state(1);
//! let label = rt.derive({
//!     let step = step.clone();
//!     move || format!("Step {} of 3", step.get())
//! });
//!
//! let output = rt
//!     .bind({
//!         let label = label.clone();
//!         move |_| label.get()
//!     })
//!     .unwrap();
//! root.append_child(&output);
//!
//! step.set(2);
//! scheduler.run_pending();
//! assert_eq!(root.text_content(), "Step 2 of 3");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::RuntimeConfig;
pub use error::{CaptureError, Error, Result};
pub use reactive::{Phase, Runtime, State};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
