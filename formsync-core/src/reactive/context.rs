//! Dependency tracking scope.
//!
//! Every thread keeps a stack of frames. An effect run pushes a tracking
//! frame; signals read while that frame is on top are recorded against it.
//! [`ReactiveContext::untracked`] pushes an opaque frame so reads made by
//! loaders, actions and state writes inside an effect are not recorded.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::SubscriberId;

enum Frame {
    Tracking {
        subscriber: SubscriberId,
        reads: SmallVec<[u64; 8]>,
    },
    Untracked,
}

impl Frame {
    fn subscriber(&self) -> Option<SubscriberId> {
        match self {
            Frame::Tracking { subscriber, .. } => Some(*subscriber),
            Frame::Untracked => None,
        }
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Scope guard for one frame; dropping it pops the frame, also on unwind.
pub struct ReactiveContext {
    subscriber: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Start recording reads for `subscriber`.
    pub fn enter(subscriber: SubscriberId) -> Self {
        Self::push(Frame::Tracking {
            subscriber,
            reads: SmallVec::new(),
        })
    }

    /// Run `f` without attributing its reads to the running computation.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _frame = Self::push(Frame::Untracked);
        f()
    }

    fn push(frame: Frame) -> Self {
        let subscriber = frame.subscriber();
        FRAMES.with(|frames| frames.borrow_mut().push(frame));
        Self { subscriber }
    }

    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Subscriber of the top frame; `None` when untracked or outside any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        FRAMES.with(|frames| frames.borrow().last().and_then(Frame::subscriber))
    }

    /// Record a read of `signal_id` in the top frame, once.
    pub fn track_dependency(signal_id: u64) {
        FRAMES.with(|frames| {
            if let Some(Frame::Tracking { reads, .. }) = frames.borrow_mut().last_mut() {
                if !reads.contains(&signal_id) {
                    reads.push(signal_id);
                }
            }
        });
    }

    /// Signals read so far in the top frame, in first-read order.
    pub fn reads() -> Vec<u64> {
        FRAMES.with(|frames| match frames.borrow().last() {
            Some(Frame::Tracking { reads, .. }) => reads.to_vec(),
            _ => Vec::new(),
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = FRAMES.with(|frames| frames.borrow_mut().pop());
        debug_assert_eq!(
            popped.as_ref().and_then(Frame::subscriber),
            self.subscriber,
            "reactive frames popped out of order"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave() {
        let id = SubscriberId::new();
        assert!(!ReactiveContext::is_active());

        {
            let _scope = ReactiveContext::enter(id);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn reads_are_recorded_once_in_order() {
        let _scope = ReactiveContext::enter(SubscriberId::new());

        for signal in [4, 1, 4, 2, 1] {
            ReactiveContext::track_dependency(signal);
        }

        assert_eq!(ReactiveContext::reads(), vec![4, 1, 2]);
    }

    #[test]
    fn untracked_frame_hides_the_effect() {
        let id = SubscriberId::new();
        let _scope = ReactiveContext::enter(id);

        let seen = ReactiveContext::untracked(|| {
            ReactiveContext::track_dependency(9);
            ReactiveContext::current_subscriber()
        });

        assert_eq!(seen, None);
        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        assert!(ReactiveContext::reads().is_empty());
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let outer = SubscriberId::new();
        let inner = SubscriberId::new();

        let _outer = ReactiveContext::enter(outer);
        ReactiveContext::track_dependency(1);
        {
            let _inner = ReactiveContext::enter(inner);
            ReactiveContext::track_dependency(2);
            assert_eq!(ReactiveContext::reads(), vec![2]);
        }
        assert_eq!(ReactiveContext::reads(), vec![1]);
    }
}
