//! Peterson's two-thread mutual exclusion.

#[cfg(feature = "check-loom")]
use loom::sync::atomic::{fence, AtomicBool, AtomicUsize};
#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{fence, AtomicBool, AtomicUsize};

use core::sync::atomic::Ordering::*;

#[cfg(not(feature = "check-loom"))]
use crossbeam_utils::Backoff;

/// Peterson's algorithm for two threads, identified as `0` and `1`.
///
/// Both acquisition stores use `Release`; the sequentially consistent fence
/// between them and the peer loads is what keeps the algorithm sound. Without
/// it, each thread may read the other's stale `want` flag and both enter the
/// critical section.
#[derive(Debug)]
pub struct Peterson {
    want: [AtomicBool; 2],
    turn: AtomicUsize,
}

impl Default for Peterson {
    fn default() -> Self {
        Self::new()
    }
}

impl Peterson {
    /// Creates a new, unheld lock.
    pub fn new() -> Self {
        Self {
            want: [AtomicBool::new(false), AtomicBool::new(false)],
            turn: AtomicUsize::new(0),
        }
    }

    /// Acquires the lock as thread `tid`.
    ///
    /// Each of the two threads must use a distinct `tid`, and the thread that
    /// acquired the lock must be the one to release it.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is not `0` or `1`.
    pub fn lock(&self, tid: usize) {
        assert!(tid < 2, "Peterson's algorithm serves exactly two threads");
        let other = 1 - tid;

        self.want[tid].store(true, Release);
        self.turn.store(other, Release);
        fence(SeqCst);

        #[cfg(not(feature = "check-loom"))]
        let backoff = Backoff::new();
        while self.want[other].load(Acquire) && self.turn.load(Acquire) == other {
            #[cfg(feature = "check-loom")]
            loom::thread::yield_now();
            #[cfg(not(feature = "check-loom"))]
            backoff.snooze();
        }
    }

    /// Releases the lock as thread `tid`.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is not `0` or `1`.
    pub fn unlock(&self, tid: usize) {
        assert!(tid < 2, "Peterson's algorithm serves exactly two threads");
        self.want[tid].store(false, Release);
    }
}
