//! Action dispatcher: an explicitly triggered async operation.
//!
//! [`Action::dispatch`] records the arguments, moves the state to `Loading`
//! and runs the operation on the ambient tokio runtime. The caller does not
//! have to wait; the outcome lands in [`Action::state`]. When the caller
//! does need it (a save flow deciding which mode to return to) the returned
//! [`Dispatched`] handle resolves to a [`Settlement`].
//!
//! A dispatch or [`Action::reset`] supersedes every earlier invocation. A
//! superseded invocation settles as [`Settlement::Discarded`] and leaves the
//! state untouched.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::Result;
use crate::reactive::{Effect, ReactiveContext, ReadSignal, Signal};
use crate::state::AsyncState;
use crate::task::{current_handle, Sequence, Ticket};

type Operation<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync>;

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T, E> {
    /// The invocation was still the newest one; its outcome is now in state.
    Applied(std::result::Result<T, E>),
    /// A later dispatch or a reset superseded it; state was not touched.
    Discarded,
}

impl<T, E> Settlement<T, E> {
    pub fn is_discarded(&self) -> bool {
        matches!(self, Settlement::Discarded)
    }

    pub fn into_result(self) -> Option<std::result::Result<T, E>> {
        match self {
            Settlement::Applied(result) => Some(result),
            Settlement::Discarded => None,
        }
    }
}

/// Handle on one invocation. Dropping it does not cancel anything.
#[derive(Debug)]
pub struct Dispatched<T, E> {
    rx: oneshot::Receiver<Settlement<T, E>>,
}

impl<T, E> Dispatched<T, E> {
    /// Wait for the invocation to finish.
    ///
    /// An invocation whose task never reported back (runtime shut down)
    /// counts as discarded.
    pub async fn settled(self) -> Settlement<T, E> {
        self.rx.await.unwrap_or(Settlement::Discarded)
    }
}

/// Explicitly triggered async operation with observable lifecycle.
///
/// # Example
///
/// ```rust
/// use formsync_core::action::{Action, Settlement};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> formsync_core::Result<()> {
/// let sign_in = Action::new(|name: String| async move {
///     if name.is_empty() { Err("name required") } else { Ok(name.len()) }
/// })?;
///
/// let settlement = sign_in.dispatch("ada".to_string()).settled().await;
/// assert_eq!(settlement, Settlement::Applied(Ok(3)));
/// assert_eq!(sign_in.last_args().as_deref(), Some("ada"));
/// # Ok(())
/// # }
/// ```
pub struct Action<A, T, E>
where
    A: Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Arc<ActionInner<A, T, E>>,
    _reset_trigger: Option<Effect>,
}

struct ActionInner<A, T, E>
where
    A: Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    state: Signal<AsyncState<T, E>>,
    last_args: Mutex<Option<A>>,
    sequence: Sequence,
    operation: Operation<A, T, E>,
    handle: Handle,
}

impl<A, T, E> Action<A, T, E>
where
    A: Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap `operation`. Fails with
    /// [`Error::NoRuntime`](crate::Error::NoRuntime) outside a tokio runtime.
    pub fn new<F, Fut>(operation: F) -> Result<Self>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        Ok(Self {
            inner: Arc::new(ActionInner::new(operation)?),
            _reset_trigger: None,
        })
    }

    /// Wrap `operation` and reset whenever `trigger` yields a different value.
    ///
    /// `trigger` runs inside an effect, so it should read the signals that
    /// define "moved on", such as the current route. Its first value only
    /// establishes the baseline.
    pub fn with_reset_trigger<F, Fut, G, R>(operation: F, trigger: G) -> Result<Self>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        G: Fn() -> R + Send + Sync + 'static,
        R: PartialEq + Send + 'static,
    {
        let inner = Arc::new(ActionInner::new(operation)?);
        let last_seen: Mutex<Option<R>> = Mutex::new(None);

        let effect = Effect::new({
            let inner = Arc::clone(&inner);
            move || {
                let current = trigger();
                let changed = {
                    let mut last = last_seen.lock();
                    let changed = last.as_ref().is_some_and(|prev| *prev != current);
                    *last = Some(current);
                    changed
                };
                if changed {
                    debug!("reset trigger fired");
                    ReactiveContext::untracked(|| inner.reset());
                }
            }
        });

        Ok(Self {
            inner,
            _reset_trigger: Some(effect),
        })
    }

    /// Start an invocation. Supersedes any invocation still in flight.
    pub fn dispatch(&self, args: A) -> Dispatched<T, E> {
        self.inner.dispatch(args)
    }

    /// Current state; tracked when read inside an effect.
    pub fn state(&self) -> AsyncState<T, E> {
        self.inner.state.get()
    }

    pub fn state_untracked(&self) -> AsyncState<T, E> {
        self.inner.state.get_untracked()
    }

    pub fn state_signal(&self) -> ReadSignal<AsyncState<T, E>> {
        self.inner.state.read_only()
    }

    /// Arguments of the newest invocation; `None` if never called or reset.
    pub fn last_args(&self) -> Option<A> {
        self.inner.last_args.lock().clone()
    }

    /// Whether the newest invocation is still running.
    pub fn pending(&self) -> bool {
        self.inner.state.with_untracked(|s| s.loading())
    }

    /// Back to `Idle`; clears the arguments and voids any in-flight result.
    pub fn reset(&self) {
        self.inner.reset();
    }
}

impl<A, T, E> Drop for Action<A, T, E>
where
    A: Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.sequence.invalidate();
    }
}

impl<A, T, E> ActionInner<A, T, E>
where
    A: Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new<F, Fut>(operation: F) -> Result<Self>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        Ok(Self {
            state: Signal::new(AsyncState::idle()),
            last_args: Mutex::new(None),
            sequence: Sequence::new(),
            operation: Arc::new(move |args| operation(args).boxed()),
            handle: current_handle()?,
        })
    }

    fn dispatch(self: &Arc<Self>, args: A) -> Dispatched<T, E> {
        // Ticket, arguments and state move together under the state lock so
        // a concurrent settle or reset sees all of them or none.
        let ticket = self.state.modify_with(|state| {
            let ticket = self.sequence.next();
            *self.last_args.lock() = Some(args.clone());
            state.begin_load();
            (true, ticket)
        });
        debug!(?args, ticket = ticket.raw(), "action dispatched");

        let run = ReactiveContext::untracked(|| (self.operation)(args));
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(self);
        self.handle.spawn(async move {
            let outcome = run.await;
            let _ = tx.send(inner.settle(ticket, outcome));
        });

        Dispatched { rx }
    }

    fn settle(&self, ticket: Ticket, outcome: std::result::Result<T, E>) -> Settlement<T, E> {
        let settlement = self.state.modify_with(|state| {
            if !self.sequence.is_current(ticket) {
                return (false, Settlement::Discarded);
            }
            let applied = outcome.clone();
            match outcome {
                Ok(value) => state.resolve(value),
                Err(error) => state.fail(error),
            }
            (true, Settlement::Applied(applied))
        });

        match &settlement {
            Settlement::Applied(applied) => {
                debug!(ticket = ticket.raw(), ok = applied.is_ok(), "action settled")
            }
            Settlement::Discarded => {
                trace!(ticket = ticket.raw(), "discarding superseded action result")
            }
        }
        settlement
    }

    fn reset(&self) {
        self.state.modify(|state| {
            self.sequence.invalidate();
            *self.last_args.lock() = None;
            state.reset();
            true
        });
        debug!("action reset");
    }
}
