//! Call sequencing shared by the resource fetcher and the action dispatcher.
//!
//! Every load or dispatch takes a [`Ticket`] when it starts. Its result may
//! only be applied while that ticket is still the newest one handed out;
//! starting another call, or invalidating on reset, makes older tickets
//! stale. Results are therefore applied in call order, not resolution order.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;

use crate::error::{Error, Result};

/// Proof of which call a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Monotonic ticket dispenser.
#[derive(Debug, Default)]
pub struct Sequence {
    latest: AtomicU64,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new call; every earlier ticket becomes stale.
    pub fn next(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Make every outstanding ticket stale without starting a call.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether results for `ticket` may still be applied.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Handle of the tokio runtime the caller is running on.
pub(crate) fn current_handle() -> Result<Handle> {
    Handle::try_current().map_err(|_| Error::NoRuntime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_ticket_is_current() {
        let sequence = Sequence::new();
        let first = sequence.next();
        assert!(sequence.is_current(first));

        let second = sequence.next();
        assert!(!sequence.is_current(first));
        assert!(sequence.is_current(second));
        assert!(second > first);
    }

    #[test]
    fn invalidate_stales_everything() {
        let sequence = Sequence::new();
        let ticket = sequence.next();
        sequence.invalidate();
        assert!(!sequence.is_current(ticket));
    }

    #[test]
    fn handle_requires_a_runtime() {
        assert!(matches!(current_handle(), Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn handle_found_inside_runtime() {
        assert!(current_handle().is_ok());
    }
}
