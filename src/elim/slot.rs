//! Exchange slots for the elimination array.

use core::sync::atomic::{AtomicI64, AtomicU8};
use core::sync::atomic::Ordering::*;
use std::thread;
use std::time::Duration;

use crossbeam_utils::{Backoff, CachePadded};
use rand::{thread_rng, Rng};

/// How long a planted operation waits for a partner before retracting.
pub const ELIM_DELAY: Duration = Duration::from_millis(10);

// Slot states. `FREE -> CLAIMED -> WAITING_* -> BUSY -> MATCHED -> FREE` for a
// matched exchange; a timed-out waiter goes `WAITING_* -> FREE` directly.
// Occupancy lives entirely in this state word, so a zero payload is as good
// as any other.
const FREE: u8 = 0;
/// The planter is writing its request into the slot.
const CLAIMED: u8 = 1;
const WAITING_PUSH: u8 = 2;
const WAITING_POP: u8 = 3;
/// A partner claimed the waiting operation and is completing the handoff.
const BUSY: u8 = 4;
/// Handoff complete; only the planter may return the slot to `FREE`.
const MATCHED: u8 = 5;

#[derive(Debug, Default)]
struct Slot {
    state: AtomicU8,
    value: AtomicI64,
}

impl Slot {
    /// Plants an operation and waits up to `delay` for the opposite side.
    ///
    /// For a push, `value` is the payload on offer; for a pop it is ignored.
    /// `Ok(v)` means the exchange happened (`v` is the pushed payload, useful
    /// to the pop side); `Err(())` means the slot was unavailable or nobody
    /// arrived in time.
    fn plant(&self, value: i64, waiting: u8, delay: Duration) -> Result<i64, ()> {
        if self
            .state
            .compare_exchange(FREE, CLAIMED, AcqRel, Relaxed)
            .is_err()
        {
            return Err(());
        }
        self.value.store(value, Relaxed);
        self.state.store(waiting, Release);

        thread::sleep(delay);

        if self
            .state
            .compare_exchange(waiting, FREE, AcqRel, Relaxed)
            .is_ok()
        {
            // Retracted without a partner.
            return Err(());
        }

        // A partner engaged; it flips the slot to MATCHED within two stores.
        let backoff = Backoff::new();
        while self.state.load(Acquire) != MATCHED {
            backoff.snooze();
        }
        let handoff = self.value.load(Relaxed);
        self.state.store(FREE, Release);
        Ok(handoff)
    }

    /// Claims an operation waiting in state `waiting`.
    ///
    /// `value` is handed to a waiting pop; the returned value is the payload
    /// of a waiting push. The claim CAS is the linearization point of the
    /// eliminated pair.
    fn match_waiting(&self, waiting: u8, value: i64) -> Result<i64, ()> {
        if self
            .state
            .compare_exchange(waiting, BUSY, AcqRel, Relaxed)
            .is_err()
        {
            return Err(());
        }
        // Exclusive access to `value` while BUSY: the waiter is parked until
        // MATCHED appears.
        let handoff = self.value.load(Relaxed);
        self.value.store(value, Relaxed);
        self.state.store(MATCHED, Release);
        Ok(handoff)
    }
}

/// A fixed-size array of exchange slots.
///
/// A push and a pop that meet in a slot cancel each other out without ever
/// touching the underlying stack; the pair linearizes at the claim CAS, as if
/// the push immediately preceded the pop.
#[derive(Debug)]
pub struct EliminationArray {
    slots: Box<[CachePadded<Slot>]>,
    delay: Duration,
}

impl EliminationArray {
    /// Creates an array of `len` slots with the default wait of
    /// [`ELIM_DELAY`].
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn new(len: usize) -> Self {
        Self::with_delay(len, ELIM_DELAY)
    }

    /// Creates an array of `len` slots whose planted operations wait `delay`
    /// for a partner. Shorter delays lower latency, longer delays raise the
    /// match probability.
    pub fn with_delay(len: usize, delay: Duration) -> Self {
        assert!(len > 0, "elimination array needs at least one slot");
        Self {
            slots: (0..len).map(|_| CachePadded::default()).collect(),
            delay,
        }
    }

    fn pick_slot(&self) -> &Slot {
        &self.slots[thread_rng().gen::<usize>() % self.slots.len()]
    }

    /// Tries to hand `value` to a concurrent pop.
    ///
    /// `Err(value)` returns the payload to the caller, which must retry the
    /// underlying stack: an unmatched attempt has not mutated anything.
    pub fn exchange_push(&self, value: i64) -> Result<(), i64> {
        let slot = self.pick_slot();
        let result = match slot.state.load(Acquire) {
            WAITING_POP => slot.match_waiting(WAITING_POP, value),
            FREE => slot.plant(value, WAITING_PUSH, self.delay),
            _ => Err(()),
        };
        result.map(|_| ()).map_err(|()| value)
    }

    /// Tries to take a value from a concurrent push.
    ///
    /// `Err(())` means no partner was found; the caller must retry the
    /// underlying stack.
    pub fn exchange_pop(&self) -> Result<i64, ()> {
        let slot = self.pick_slot();
        match slot.state.load(Acquire) {
            WAITING_PUSH => slot.match_waiting(WAITING_PUSH, 0),
            FREE => slot.plant(0, WAITING_POP, self.delay),
            _ => Err(()),
        }
    }
}
