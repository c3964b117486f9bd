use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of an effect or an explicit signal listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    /// A process-wide unique id.
    pub fn new() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback registered with [`Signal::subscribe`](super::Signal::subscribe).
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    pub fn with_id(id: SubscriberId, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id,
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn notify(&self) {
        (self.callback)()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.id.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ids_increase() {
        let first = SubscriberId::new();
        let second = SubscriberId::new();
        assert!(second > first);
    }

    #[test]
    fn clones_share_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscriber = Subscriber::with_id(SubscriberId::new(), {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        let copy = subscriber.clone();
        subscriber.notify();
        copy.notify();

        assert_eq!(copy.id(), subscriber.id());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
