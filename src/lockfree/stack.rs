//! Treiber's lock-free stack.

use core::sync::atomic::Ordering::*;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::Backoff;

/// Treiber's lock-free stack of integers.
///
/// Usable with any number of producers and consumers. All contention resolves
/// through retries of the compare-and-swap on `top`; popped nodes are retired
/// through epoch-based reclamation, so no dereference can outlive the node.
#[derive(Debug, Default)]
pub struct TreiberStack {
    top: Atomic<Node>,
}

#[derive(Debug)]
struct Node {
    value: i64,
    next: Atomic<Node>,
}

impl TreiberStack {
    /// Creates a new, empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `value` on top of the stack.
    pub fn push(&self, value: i64) {
        let mut node = Owned::new(Node {
            value,
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let top = self.top.load(Acquire, &guard);
            // Private store into the not-yet-published node.
            node.next.store(top, Relaxed);

            // Skip the CAS when the witness is already stale.
            if self.top.load(Relaxed, &guard) != top {
                backoff.spin();
                continue;
            }

            match self.top.compare_exchange(top, node, AcqRel, Relaxed, &guard) {
                Ok(_) => return,
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the most recently pushed value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<i64> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let top = self.top.load(Acquire, &guard);
            let node = unsafe { top.as_ref() }?;
            let next = node.next.load(Relaxed, &guard);

            // Skip the CAS when the witness is already stale.
            if self.top.load(Relaxed, &guard) != top {
                backoff.spin();
                continue;
            }

            if self
                .top
                .compare_exchange(top, next, AcqRel, Relaxed, &guard)
                .is_ok()
            {
                let value = node.value;
                // SAFETY: the CAS detached `top`, so it is unreachable from
                // the stack and no new reference to it can be created.
                unsafe { guard.defer_destroy(top) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// A single push attempt: one read of `top`, one CAS.
    ///
    /// Returns the value back on contention so the caller can try a side
    /// channel before retrying.
    pub fn try_push(&self, value: i64) -> Result<(), i64> {
        let guard = epoch::pin();
        let node = Owned::new(Node {
            value,
            next: Atomic::null(),
        });

        let top = self.top.load(Acquire, &guard);
        node.next.store(top, Relaxed);
        self.top
            .compare_exchange(top, node, AcqRel, Relaxed, &guard)
            .map(|_| ())
            .map_err(|e| e.new.value)
    }

    /// A single pop attempt.
    ///
    /// `Ok(Some(v))` on success, `Ok(None)` on an empty stack, `Err(())` when
    /// the CAS lost a race.
    pub fn try_pop(&self) -> Result<Option<i64>, ()> {
        let guard = epoch::pin();

        let top = self.top.load(Acquire, &guard);
        let Some(node) = (unsafe { top.as_ref() }) else {
            return Ok(None);
        };
        let next = node.next.load(Relaxed, &guard);

        self.top
            .compare_exchange(top, next, AcqRel, Relaxed, &guard)
            .map_err(|_| ())?;

        let value = node.value;
        // SAFETY: the CAS detached `top`; see `pop`.
        unsafe { guard.defer_destroy(top) };
        Ok(Some(value))
    }

    /// Returns `true` if the stack is empty.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.top.load(Acquire, &guard).is_null()
    }
}

impl Drop for TreiberStack {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use std::thread::scope;

    use super::*;

    #[test]
    fn push_pop_seq() {
        let stack = TreiberStack::new();
        assert!(stack.is_empty());

        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn try_ops_seq() {
        let stack = TreiberStack::new();
        assert_eq!(stack.try_push(7), Ok(()));
        assert_eq!(stack.try_pop(), Ok(Some(7)));
        assert_eq!(stack.try_pop(), Ok(None));
    }

    #[test]
    fn push_pop_concurrent() {
        let stack = TreiberStack::new();

        scope(|s| {
            for _ in 0..10 {
                s.spawn(|| {
                    for i in 0..10_000 {
                        stack.push(i);
                        assert!(stack.pop().is_some());
                    }
                });
            }
        });

        assert_eq!(stack.pop(), None);
    }
}
