//! Reactive Primitives
//!
//! Signals and effects, the explicit dependency graph underneath the
//! resource fetcher and action dispatcher.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside an effect
//! registers the effect as a dependent; writing it re-runs every dependent
//! and calls every explicit subscriber.
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever one of the signals it
//! read last time changes. Key selectors and reset triggers run inside
//! effects, which is what makes a resource re-fetch when its key moves.
//!
//! # Implementation Notes
//!
//! A thread-local tracking stack detects which computation is running when
//! a signal is read. The edges themselves live in a global [`Runtime`]
//! keyed by [`SubscriberId`], so a signal written on one thread still
//! reaches effects created on another.

mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use context::ReactiveContext;
pub use effect::Effect;
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::{ReadSignal, Signal};
pub use subscriber::{Subscriber, SubscriberId};
