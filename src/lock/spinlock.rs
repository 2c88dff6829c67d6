//! Test-and-set spin lock.

use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering::*;

use crossbeam_utils::Backoff;

use super::{RawLock, RawTryLock};

/// A spin lock over a single test-and-set boolean.
///
/// Acquisition is a sequentially consistent compare-and-swap of `false` to
/// `true`, so competing acquisitions are totally ordered; release is a plain
/// `Release` store of `false`.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

unsafe impl RawLock for SpinLock {
    type Token = ();

    fn lock(&self) {
        let backoff = Backoff::new();

        while self
            .locked
            .compare_exchange(false, true, SeqCst, Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }

    unsafe fn unlock(&self, _token: ()) {
        self.locked.store(false, Release);
    }
}

unsafe impl RawTryLock for SpinLock {
    fn try_lock(&self) -> Result<(), ()> {
        self.locked
            .compare_exchange(false, true, SeqCst, Relaxed)
            .map(|_| ())
            .map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::SpinLock;

    #[test]
    fn smoke() {
        crate::lock::tests::smoke::<SpinLock>();
    }
}
