//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a signal
//! it read during its previous run changes.
//!
//! # How Effects Work
//!
//! 1. On creation the effect registers with the [`Runtime`] and runs once to
//!    establish its dependencies.
//!
//! 2. When any dependency changes, the runtime schedules the effect.
//!
//! 3. Before re-running, the effect drops its old dependency edges and
//!    collects new ones during execution.
//!
//! The resource fetcher and action dispatcher use effects to watch their key
//! selector and reset trigger; consumers use them to react to `AsyncState`.
//!
//! # Re-entrancy
//!
//! An effect that is scheduled while it is already running (for example
//! because it wrote a signal it also reads) does not recurse. The request is
//! recorded and the effect runs once more after the current pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A side-effecting computation that runs when dependencies change.
///
/// Clones share the same computation. The effect is disposed and leaves the
/// runtime when the last clone is dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
/// use formsync_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let _effect = Effect::new({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.store(count.get(), Ordering::SeqCst)
/// });
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    dependencies: RwLock<HashSet<u64>>,
    disposed: AtomicBool,
    running: AtomicBool,
    pending: AtomicBool,
    run_count: AtomicUsize,
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        let handle = Runtime::register(inner.clone());
        inner.execute();

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect now, re-collecting its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Schedule the effect to re-run.
    pub fn schedule(&self) {
        self.inner.schedule();
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        Runtime::clear_dependencies(self.inner.subscriber_id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if self.running.swap(true, Ordering::SeqCst) {
            trace!(effect_id = self.id, "effect re-entered; deferring");
            self.pending.store(true, Ordering::SeqCst);
            return;
        }

        loop {
            self.run_once();
            if !self.pending.swap(false, Ordering::SeqCst) || self.disposed.load(Ordering::SeqCst) {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        // A schedule from another thread may land between the last swap and
        // the store above.
        if self.pending.swap(false, Ordering::SeqCst) {
            self.execute();
        }
    }

    fn run_once(&self) {
        Runtime::clear_dependencies(self.subscriber_id);

        let new_deps: HashSet<u64> = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.run)();
            ReactiveContext::reads().into_iter().collect()
        };

        *self.dependencies.write() = new_deps;
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn schedule(&self) {
        self.execute();
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
