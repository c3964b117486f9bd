//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tells two kinds of listeners when that value changes:
//!
//! 1. Effects that read the signal while tracking. These edges live in the
//!    [`Runtime`] and are rebuilt every time the effect runs.
//!
//! 2. Explicit callbacks registered with [`Signal::subscribe`]. These stay
//!    until [`Signal::unsubscribe`] is called.
//!
//! # Thread Safety
//!
//! The value sits behind a `parking_lot::RwLock`. No lock is held while
//! listeners run, so a listener may read or write any signal, this one
//! included.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A reactive cell holding a value of type `T`.
///
/// Clones share the same value and listeners.
///
/// # Example
///
/// ```rust
/// use formsync_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// count.update(|v| v + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    notifiers: Arc<RwLock<SmallVec<[Subscriber; 2]>>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            notifiers: Arc::new(RwLock::new(SmallVec::new())),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the current value, registering a dependency when tracking.
    pub fn get(&self) -> T {
        self.track();
        self.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value, registering a dependency when tracking.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.value.read())
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.id);
            Runtime::add_dependency(self.id, subscriber_id);
        }
    }

    /// Set a new value and notify every listener.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.notify();
    }

    /// Replace the value with one computed from the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.value.read());
        self.set(new_value);
    }

    /// Mutate the value in place.
    ///
    /// `f` returns whether it changed anything; listeners are only notified
    /// when it did. The write lock is held while `f` runs, so `f` must not
    /// touch this signal.
    pub fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.modify_with(|value| {
            let changed = f(value);
            (changed, changed)
        })
    }

    /// Like [`modify`](Self::modify), also returning a result computed
    /// under the write lock.
    ///
    /// `f` returns `(changed, result)`. Decisions that must not interleave
    /// with other writers (is this result still wanted?) belong in `f`.
    pub fn modify_with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> (bool, R),
    {
        let (changed, result) = f(&mut self.value.write());
        if changed {
            self.notify();
        }
        result
    }

    /// Register a change callback under the given subscriber id.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifiers
            .write()
            .push(Subscriber::with_id(subscriber_id, notify));
    }

    /// Remove an explicit subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.notifiers.write().retain(|s| s.id() != subscriber_id);
    }

    /// Number of explicit subscribers plus tracked dependents.
    pub fn subscriber_count(&self) -> usize {
        self.notifiers.read().len() + Runtime::dependent_count(self.id)
    }

    /// A view of this signal that cannot write it.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            inner: self.clone(),
        }
    }

    fn notify(&self) {
        let notifiers: SmallVec<[Subscriber; 2]> = self.notifiers.read().clone();
        for subscriber in notifiers.iter() {
            subscriber.notify();
        }
        Runtime::notify_signal_change(self.id);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            notifiers: Arc::clone(&self.notifiers),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Read-only view over a [`Signal`].
///
/// Owners hand this out so consumers can observe state they must not write.
pub struct ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Signal<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn get(&self) -> T {
        self.inner.get()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with_untracked(f)
    }

    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribe(subscriber_id, notify);
    }

    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner.unsubscribe(subscriber_id);
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for ReadSignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn modify_notifies_only_on_change() {
        let signal = Signal::new(vec![1, 2]);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        signal.subscribe(SubscriberId::new(), move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!signal.modify(|_| false));
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert!(signal.modify(|v| {
            v.push(3);
            true
        }));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.get(), vec![1, 2, 3]);
    }

    #[test]
    fn modify_with_returns_result_and_gates_notification() {
        let signal = Signal::new(5);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        signal.subscribe(SubscriberId::new(), move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let seen = signal.modify_with(|v| (false, *v));
        assert_eq!(seen, 5);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        let previous = signal.modify_with(|v| (true, std::mem::replace(v, 6)));
        assert_eq!(previous, 5);
        assert_eq!(signal.get_untracked(), 6);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        signal.subscribe(SubscriberId::new(), move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subscriber_id = SubscriberId::new();
        signal.subscribe(subscriber_id, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        signal.unsubscribe(subscriber_id);
        signal.set(2);

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_write_the_signal_it_watches() {
        let signal = Signal::new(0);
        let writer = signal.clone();
        signal.subscribe(SubscriberId::new(), move || {
            if writer.get_untracked() == 1 {
                writer.set(2);
            }
        });

        signal.set(1);
        assert_eq!(signal.get(), 2);
    }

    #[test]
    fn read_only_view_observes_writes() {
        let signal = Signal::new("draft".to_string());
        let view = signal.read_only();

        signal.set("saved".to_string());
        assert_eq!(view.get(), "saved");
        assert_eq!(view.id(), signal.id());
        assert_eq!(view.with(|s| s.len()), 5);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
