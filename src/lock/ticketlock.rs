//! Fetch-and-increment ticket lock.

use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering::*;

use crossbeam_utils::Backoff;

use super::RawLock;

/// A fair ticket lock.
///
/// Each acquisition takes a ticket with a sequentially consistent
/// fetch-and-increment, so tickets form a global total order and the lock is
/// granted strictly in arrival order.
#[derive(Debug, Default)]
pub struct TicketLock {
    curr: AtomicUsize,
    next: AtomicUsize,
}

unsafe impl RawLock for TicketLock {
    type Token = usize;

    fn lock(&self) -> usize {
        let ticket = self.next.fetch_add(1, SeqCst);
        let backoff = Backoff::new();

        while self.curr.load(Acquire) != ticket {
            backoff.snooze();
        }

        ticket
    }

    unsafe fn unlock(&self, ticket: usize) {
        self.curr.store(ticket.wrapping_add(1), Release);
    }
}
