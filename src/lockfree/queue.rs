//! Michael-Scott lock-free queue.
//!
//! Michael and Scott. Simple, Fast, and Practical Non-Blocking and Blocking
//! Concurrent Queue Algorithms. PODC 1996.
//! <http://dl.acm.org/citation.cfm?id=248106>

use core::sync::atomic::Ordering::*;

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};

/// Michael-Scott queue of integers.
///
/// The representation is a singly-linked list with a sentinel node at the
/// front whose value is never returned. `tail` may lag one node behind the
/// actual last node; enqueuers that observe the lag help advance it before
/// linking their own node.
#[derive(Debug)]
pub struct MsQueue {
    head: CachePadded<Atomic<Node>>,
    tail: CachePadded<Atomic<Node>>,
}

#[derive(Debug)]
struct Node {
    /// Meaningless in the sentinel; every other node carries the enqueued
    /// value until a dequeue hands it out and the node becomes the sentinel.
    value: i64,
    next: Atomic<Node>,
}

impl Default for MsQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MsQueue {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(Node {
            value: 0,
            next: Atomic::null(),
        }))
        .cast_const();

        Self {
            head: CachePadded::new(sentinel.into()),
            tail: CachePadded::new(sentinel.into()),
        }
    }

    /// Adds `value` to the back of the queue.
    pub fn enqueue(&self, value: i64) {
        let mut node = Owned::new(Node {
            value,
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Acquire, &guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, &guard);

            // Snapshot validation: retry if `tail` moved under us.
            if self.tail.load(Acquire, &guard) != tail {
                backoff.spin();
                continue;
            }

            if !next.is_null() {
                // The tail is lagging: help the finished enqueue before
                // retrying our own.
                let _ = self.tail.compare_exchange(tail, next, AcqRel, Relaxed, &guard);
                continue;
            }

            // `tail` looks like the last node; linking here is the
            // linearization point of enqueue.
            match tail_ref
                .next
                .compare_exchange(Shared::null(), node, AcqRel, Relaxed, &guard)
            {
                Ok(node) => {
                    // Swing `tail` to the new node. Failure is harmless: some
                    // peer already helped.
                    let _ = self.tail.compare_exchange(tail, node, AcqRel, Relaxed, &guard);
                    return;
                }
                Err(e) => {
                    node = e.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Removes the value at the front of the queue, or `None` if the queue is
    /// empty.
    ///
    /// The old sentinel is retired and the dequeued node takes its place.
    pub fn dequeue(&self) -> Option<i64> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Acquire, &guard);
            let tail = self.tail.load(Acquire, &guard);
            let next = unsafe { head.deref() }.next.load(Acquire, &guard);

            // Snapshot validation, same as enqueue.
            if self.head.load(Acquire, &guard) != head {
                backoff.spin();
                continue;
            }

            if head == tail {
                if next.is_null() {
                    // Empty. The load of `head.next` above is the
                    // linearization point of this outcome.
                    return None;
                }
                // Tail is lagging behind a finished enqueue; help it along.
                let _ = self.tail.compare_exchange(tail, next, AcqRel, Relaxed, &guard);
                continue;
            }

            // Non-empty, so `next` exists. Its value is tentative until the
            // head swing commits.
            let next_ref = unsafe { next.deref() };
            let value = next_ref.value;

            // Skip the CAS when the witness is already stale.
            if self.head.load(Relaxed, &guard) != head {
                backoff.spin();
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, AcqRel, Relaxed, &guard)
                .is_ok()
            {
                // SAFETY: the CAS detached the old sentinel `head`; `next` is
                // the new sentinel and remains reachable.
                unsafe { guard.defer_destroy(head) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Acquire, &guard);
        unsafe { head.deref() }.next.load(Acquire, &guard).is_null()
    }
}

impl Drop for MsQueue {
    fn drop(&mut self) {
        // SAFETY: we have `&mut self`, so no other thread holds a reference;
        // every node in the chain (sentinel included) was allocated by us.
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(Relaxed, guard);
            while let Some(node_ref) = node.as_ref() {
                let next = node_ref.next.load(Relaxed, guard);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread::scope;

    use super::*;

    #[test]
    fn enqueue_dequeue_seq() {
        let queue = MsQueue::new();
        assert!(queue.is_empty());

        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert!(!queue.is_empty());

        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn fifo_order_long() {
        let queue = MsQueue::new();
        for i in 0..200 {
            queue.enqueue(i);
        }
        for i in 0..200 {
            assert_eq!(queue.dequeue(), Some(i));
        }
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn spsc_order() {
        const COUNT: i64 = 100_000;
        let queue = MsQueue::new();

        scope(|s| {
            s.spawn(|| {
                let mut next = 0;
                while next < COUNT {
                    if let Some(value) = queue.dequeue() {
                        assert_eq!(value, next);
                        next += 1;
                    }
                }
            });

            for i in 0..COUNT {
                queue.enqueue(i);
            }
        });

        assert!(queue.is_empty());
    }

    #[test]
    fn mpmc_balance() {
        const PER_THREAD: i64 = 10_000;
        const THREADS: i64 = 4;

        let queue = MsQueue::new();

        scope(|s| {
            for t in 0..THREADS {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        queue.enqueue(t * PER_THREAD + i);
                    }
                });
            }
            for _ in 0..THREADS {
                s.spawn(|| {
                    let mut got = 0;
                    while got < PER_THREAD {
                        if queue.dequeue().is_some() {
                            got += 1;
                        }
                    }
                });
            }
        });

        assert!(queue.is_empty());
    }

    #[test]
    fn is_empty_does_not_consume() {
        let queue = MsQueue::new();
        queue.enqueue(20);
        queue.enqueue(20);
        assert!(!queue.is_empty());
        assert!(queue.dequeue().is_some());
        assert!(!queue.is_empty());
    }
}
