//! Reactive Runtime
//!
//! The runtime connects signals to the effects that read them.
//!
//! # How It Works
//!
//! 1. An effect registers with the runtime when it is created.
//!
//! 2. While the effect runs, every tracked signal read records a
//!    signal → subscriber edge.
//!
//! 3. When a signal is set, the runtime looks up its subscribers, upgrades
//!    the live ones and schedules them. Edges are rebuilt on every run, so a
//!    computation only reacts to the signals it read last time.
//!
//! # Thread Safety
//!
//! Both maps are `DashMap`s. No shard guard is held while a computation is
//! scheduled, so an effect may freely read or write signals while it runs.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;

type Dependents = SmallVec<[SubscriberId; 4]>;

/// A computation the runtime can re-run when one of its inputs changes.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Re-run the computation.
    fn schedule(&self);
}

/// Handle to a registered reactive computation.
///
/// Dropping this handle unregisters the computation from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The id the computation was registered under.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Weak references so a registered computation is still freed with its owner.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static SIGNAL_SUBSCRIBERS: OnceLock<DashMap<u64, Dependents>> = OnceLock::new();

fn get_registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn get_signal_subscribers() -> &'static DashMap<u64, Dependents> {
    SIGNAL_SUBSCRIBERS.get_or_init(DashMap::new)
}

impl Runtime {
    /// Register a reactive computation.
    ///
    /// Returns a handle that unregisters it when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        get_registry().insert(id, Arc::downgrade(&reactive));
        ReactiveHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        get_registry().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Check whether a computation is currently registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        get_registry().contains_key(&id)
    }

    /// Record that a subscriber depends on a signal.
    pub fn add_dependency(signal_id: u64, subscriber_id: SubscriberId) {
        let mut subs = get_signal_subscribers().entry(signal_id).or_default();
        if !subs.contains(&subscriber_id) {
            subs.push(subscriber_id);
        }
    }

    /// Remove every edge pointing at a subscriber.
    ///
    /// Called before re-running a computation so stale dependencies drop out.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let subscribers = get_signal_subscribers();
        for mut subs in subscribers.iter_mut() {
            subs.retain(|s| *s != subscriber_id);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
    }

    /// Number of computations currently depending on a signal.
    pub fn dependent_count(signal_id: u64) -> usize {
        get_signal_subscribers()
            .get(&signal_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Notify every computation that depends on a signal.
    pub fn notify_signal_change(signal_id: u64) {
        let subscriber_ids: Dependents = match get_signal_subscribers().get(&signal_id) {
            Some(subs) => subs.clone(),
            None => return,
        };

        let mut to_run = Vec::with_capacity(subscriber_ids.len());
        for sub_id in subscriber_ids {
            let live = get_registry().get(&sub_id).and_then(|weak| weak.upgrade());
            if let Some(reactive) = live {
                to_run.push(reactive);
            }
        }

        trace!(signal_id, scheduled = to_run.len(), "signal changed");

        for reactive in to_run {
            reactive.schedule();
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
