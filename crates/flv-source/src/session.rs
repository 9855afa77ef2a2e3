use std::sync::atomic::{AtomicU64, Ordering};

const SHUTDOWN_BIT: u64 = 1 << 63;
const COUNTER_MASK: u64 = SHUTDOWN_BIT - 1;

/// Restart counter and shutdown flag packed into one word.
///
/// Every read captures a ticket before it is issued. Its completion is only
/// applied if the ticket still matches, which discards both reads issued
/// before a stop and anything that finishes after shutdown.
#[derive(Debug, Default)]
pub(crate) struct Session(AtomicU64);

impl Session {
    pub(crate) fn ticket(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn is_current(&self, ticket: u64) -> bool {
        ticket & SHUTDOWN_BIT == 0 && self.ticket() == ticket
    }

    /// Invalidates every outstanding ticket. The shutdown bit is preserved.
    pub(crate) fn restart(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                let counter = (value & COUNTER_MASK).wrapping_add(1) & COUNTER_MASK;
                Some((value & SHUTDOWN_BIT) | counter)
            });
    }

    pub(crate) fn shutdown(&self) {
        self.0.fetch_or(SHUTDOWN_BIT, Ordering::AcqRel);
    }
}
