//! Resource fetcher: a reactive key bound to an async loader.
//!
//! The key selector runs inside an [`Effect`], so any signal it reads makes
//! the resource reactive. Whenever the selected key changes the loader is
//! started for the new key on the ambient tokio runtime.
//!
//! Keys are compared by value (`K: PartialEq`). Selecting a key equal to the
//! current one does nothing; use [`Resource::refetch`] to reload.
//!
//! Loads are sequenced with [`Sequence`]: only the newest load may write the
//! state, so a slow response for an old key can never replace the value for
//! the key selected after it. Dropping the resource makes every in-flight
//! load inert.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::error::Result;
use crate::reactive::{Effect, ReactiveContext, ReadSignal, Signal};
use crate::state::AsyncState;
use crate::task::{current_handle, Sequence, Ticket};

type Loader<K, T, E> = Arc<dyn Fn(K) -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync>;

/// Server state behind a key, with stale-while-revalidate semantics.
///
/// # Example
///
/// ```rust
/// use formsync_core::reactive::Signal;
/// use formsync_core::resource::Resource;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> formsync_core::Result<()> {
/// let template_id = Signal::new(Some(7u64));
/// let template = Resource::new(
///     {
///         let template_id = template_id.clone();
///         move || template_id.get()
///     },
///     |id: u64| async move { Ok::<_, String>(format!("template {id}")) },
/// )?;
///
/// assert!(template.state().loading());
/// # Ok(())
/// # }
/// ```
pub struct Resource<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Arc<ResourceInner<K, T, E>>,
    _effect: Effect,
}

struct ResourceInner<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    state: Signal<AsyncState<T, E>>,
    key: Mutex<Option<K>>,
    sequence: Sequence,
    loader: Loader<K, T, E>,
    handle: Handle,
    loads: AtomicUsize,
}

impl<K, T, E> Resource<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Bind `key_selector` to `loader`.
    ///
    /// The selector runs immediately; a `Some` key starts the first load.
    /// Fails with [`Error::NoRuntime`](crate::Error::NoRuntime) outside a
    /// tokio runtime.
    pub fn new<S, L, Fut>(key_selector: S, loader: L) -> Result<Self>
    where
        S: Fn() -> Option<K> + Send + Sync + 'static,
        L: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let loader: Loader<K, T, E> = Arc::new(move |key| loader(key).boxed());
        let inner = Arc::new(ResourceInner {
            state: Signal::new(AsyncState::idle()),
            key: Mutex::new(None),
            sequence: Sequence::new(),
            loader,
            handle: current_handle()?,
            loads: AtomicUsize::new(0),
        });

        let effect = Effect::new({
            let inner = Arc::clone(&inner);
            move || {
                let next = key_selector();
                ReactiveContext::untracked(|| inner.select(next));
            }
        });

        Ok(Self {
            inner,
            _effect: effect,
        })
    }

    /// Current state; tracked when read inside an effect.
    pub fn state(&self) -> AsyncState<T, E> {
        self.inner.state.get()
    }

    pub fn state_untracked(&self) -> AsyncState<T, E> {
        self.inner.state.get_untracked()
    }

    /// Read-only handle on the state for subscribers.
    pub fn state_signal(&self) -> ReadSignal<AsyncState<T, E>> {
        self.inner.state.read_only()
    }

    /// Latest value, if any, without tracking.
    pub fn value(&self) -> Option<T> {
        self.inner.state.with_untracked(|s| s.value().cloned())
    }

    /// Key of the most recent load, `None` while idle.
    pub fn key(&self) -> Option<K> {
        self.inner.key.lock().clone()
    }

    /// Number of times the loader has been invoked.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Overwrite the cached value without calling the loader.
    ///
    /// `loading` and `error` are left as they are.
    pub fn mutate(&self, value: T) {
        self.inner.state.modify(|state| {
            state.replace_value(value);
            true
        });
    }

    /// Overwrite the cached value from the previous one.
    pub fn mutate_with<F>(&self, f: F)
    where
        F: FnOnce(Option<&T>) -> T,
    {
        self.inner.state.modify(|state| {
            let next = f(state.value());
            state.replace_value(next);
            true
        });
    }

    /// Reload the current key. Does nothing while no key is selected.
    pub fn refetch(&self) {
        let key = self.inner.key.lock().clone();
        if let Some(key) = key {
            self.inner.start_load(key);
        }
    }
}

impl<K, T, E> Drop for Resource<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.sequence.invalidate();
    }
}

impl<K, T, E> ResourceInner<K, T, E>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn select(self: &Arc<Self>, next: Option<K>) {
        {
            let mut key = self.key.lock();
            if *key == next {
                return;
            }
            *key = next.clone();
        }

        match next {
            Some(key) => self.start_load(key),
            None => {
                debug!("resource key cleared");
                self.state.modify(|state| {
                    self.sequence.invalidate();
                    state.reset();
                    true
                });
            }
        }
    }

    fn start_load(self: &Arc<Self>, key: K) {
        // Taken under the state lock so a settle in flight cannot slip in
        // between the new ticket and `Loading`.
        let ticket = self.state.modify_with(|state| {
            let ticket = self.sequence.next();
            state.begin_load();
            (true, ticket)
        });
        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(?key, ticket = ticket.raw(), "resource load started");

        let load = ReactiveContext::untracked(|| (self.loader)(key.clone()));
        let inner = Arc::clone(self);
        self.handle.spawn(async move {
            let outcome = load.await;
            inner.settle(ticket, &key, outcome);
        });
    }

    fn settle(&self, ticket: Ticket, key: &K, outcome: std::result::Result<T, E>) {
        let ok = outcome.is_ok();
        let applied = self.state.modify(|state| {
            if !self.sequence.is_current(ticket) {
                return false;
            }
            match outcome {
                Ok(value) => state.resolve(value),
                Err(error) => state.fail(error),
            }
            true
        });

        if applied {
            debug!(?key, ticket = ticket.raw(), ok, "resource load settled");
        } else {
            trace!(?key, ticket = ticket.raw(), "discarding stale load result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use std::time::Duration;

    #[test]
    fn construction_outside_runtime_fails() {
        let result = Resource::new(|| Some(1u32), |_k: u32| async { Ok::<u32, String>(1) });
        assert!(matches!(result, Err(crate::Error::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn loads_initial_key() {
        let resource = Resource::new(
            || Some(5u32),
            |k: u32| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(k * 2)
            },
        )
        .unwrap();

        assert!(resource.state().is_first_load());
        assert_eq!(resource.key(), Some(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resource.state(), AsyncState::ready(10));
        assert_eq!(resource.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_last_good_value() {
        let fail = Signal::new(false);
        let key = Signal::new(Some(1u32));
        let resource = Resource::new(
            {
                let key = key.clone();
                move || key.get()
            },
            {
                let fail = fail.clone();
                move |k: u32| {
                    let fail = fail.get_untracked();
                    async move {
                        if fail {
                            Err(format!("no template {k}"))
                        } else {
                            Ok(k)
                        }
                    }
                }
            },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(resource.value(), Some(1));

        fail.set(true);
        key.set(Some(2));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let state = resource.state();
        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.value(), Some(&1));
        assert_eq!(state.error().map(String::as_str), Some("no template 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_reloads_current_key() {
        let resource = Resource::new(
            || Some("k".to_string()),
            |k: String| async move { Ok::<_, ()>(k.len()) },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        resource.refetch();
        assert!(resource.state().is_refreshing());
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(resource.load_count(), 2);
        assert_eq!(resource.state(), AsyncState::ready(1));
    }

    #[tokio::test(start_paused = true)]
    async fn equal_key_does_not_reload() {
        let key = Signal::new(Some(3u32));
        let resource = Resource::new(
            {
                let key = key.clone();
                move || key.get()
            },
            |k: u32| async move { Ok::<_, ()>(k) },
        )
        .unwrap();

        key.set(Some(3));
        key.set(Some(3));
        assert_eq!(resource.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_key_goes_idle_and_discards_in_flight() {
        let key = Signal::new(Some(1u32));
        let resource = Resource::new(
            {
                let key = key.clone();
                move || key.get()
            },
            |k: u32| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ()>(k)
            },
        )
        .unwrap();

        key.set(None);
        assert!(resource.state().is_idle());
        assert_eq!(resource.key(), None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(resource.state().is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn clearing_key_racing_settle_on_worker_threads_stays_idle() {
        let key = Signal::new(None::<u32>);
        let resource = Resource::new(
            {
                let key = key.clone();
                move || key.get()
            },
            |k: u32| async move {
                tokio::task::yield_now().await;
                Ok::<_, ()>(k)
            },
        )
        .unwrap();

        for n in 0..300u32 {
            key.set(Some(n));
            for _ in 0..(n % 4) {
                tokio::task::yield_now().await;
            }
            key.set(None);
            tokio::time::sleep(Duration::from_millis(1)).await;

            let state = resource.state_untracked();
            assert!(state.is_idle(), "iteration {n}: {state:?}");
            assert_eq!(state.value(), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mutate_with_sees_previous_value() {
        let resource =
            Resource::new(|| Some(1u32), |_k: u32| async { Ok::<_, ()>(vec![1, 2]) }).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        resource.mutate_with(|prev| {
            let mut next = prev.cloned().unwrap_or_default();
            next.push(3);
            next
        });

        assert_eq!(resource.value(), Some(vec![1, 2, 3]));
        assert_eq!(resource.load_count(), 1);
    }
}
