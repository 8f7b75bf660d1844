//! Reactive Primitives
//!
//! This module implements the state-propagation engine: states,
//! derivations, and bindings, coordinated by a [`Runtime`].
//!
//! # Concepts
//!
//! ## States
//!
//! A State is a container for mutable data. Reading it inside a tracked
//! function (a derivation or a binding's render function) registers a
//! dependency. Writing it schedules a commit that brings every dependent up
//! to date.
//!
//! ## Derivations
//!
//! A derivation is a state computed from other states. Derivations re-run
//! inside a commit until no derived value changes any more (or a round cap
//! is hit).
//!
//! ## Bindings
//!
//! A binding connects a render function to the fragment it produced. After
//! derivations settle, bindings whose inputs changed re-render and patch
//! their fragment in place.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the runtime keeps a stack of dependency
//! sets, and every read or write lands in the top one. Subscribers are
//! never updated in place. Each re-run produces a fresh subscriber and
//! retires the previous one, and retired or detached subscribers are pruned
//! lazily by commits and by a debounced sweep.

mod binding;
mod context;
mod derive;
mod gc;
mod runtime;
mod state;
mod subscriber;

pub use binding::update;
pub use runtime::{Phase, Runtime};
pub use state::State;
pub use subscriber::{StateId, SubscriberId};
