//! Multi-threaded drivers that exercise the containers and tally outcomes.
//!
//! A driver splits its workers into producer and consumer halves over a shared
//! container, the way the benchmark binary and the scenario tests drive every
//! implementation. Workers report per-thread tallies over a channel; the
//! aggregate [`Outcome`] carries what the invariant checks need: for queues,
//! sum equality between what went in and what came out; for stacks,
//! producer-consumer count equality.

use std::thread::scope;

use crossbeam_utils::Backoff;

use crate::elim::{BackoffStack, ElimStack};
use crate::fc::{FcQueue, FcStack};
use crate::lockfree::{MsQueue, StampedStack, TreiberStack};
use crate::sgl::{SglQueue, SglStack};

/// Anything with stack semantics the drivers can exercise.
pub trait ConcurrentStack: Sync {
    /// Pushes `value` on top of the stack.
    fn push(&self, value: i64);
    /// Pops the most recently pushed value, or `None` if the stack is empty.
    fn pop(&self) -> Option<i64>;
}

/// Anything with queue semantics the drivers can exercise.
pub trait ConcurrentQueue: Sync {
    /// Adds `value` to the back of the queue.
    fn enqueue(&self, value: i64);
    /// Removes the value at the front, or `None` if the queue is empty.
    fn dequeue(&self) -> Option<i64>;
}

impl ConcurrentStack for TreiberStack {
    fn push(&self, value: i64) {
        TreiberStack::push(self, value)
    }
    fn pop(&self) -> Option<i64> {
        TreiberStack::pop(self)
    }
}

impl ConcurrentStack for StampedStack {
    fn push(&self, value: i64) {
        StampedStack::push(self, value)
    }
    fn pop(&self) -> Option<i64> {
        StampedStack::pop(self)
    }
}

impl ConcurrentStack for SglStack {
    fn push(&self, value: i64) {
        SglStack::push(self, value)
    }
    fn pop(&self) -> Option<i64> {
        SglStack::pop(self)
    }
}

impl<S: BackoffStack> ConcurrentStack for ElimStack<S> {
    fn push(&self, value: i64) {
        ElimStack::push(self, value)
    }
    fn pop(&self) -> Option<i64> {
        ElimStack::pop(self)
    }
}

impl ConcurrentStack for FcStack {
    fn push(&self, value: i64) {
        FcStack::push(self, value)
    }
    fn pop(&self) -> Option<i64> {
        FcStack::pop(self)
    }
}

impl ConcurrentQueue for MsQueue {
    fn enqueue(&self, value: i64) {
        MsQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<i64> {
        MsQueue::dequeue(self)
    }
}

impl ConcurrentQueue for SglQueue {
    fn enqueue(&self, value: i64) {
        SglQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<i64> {
        SglQueue::dequeue(self)
    }
}

impl ConcurrentQueue for FcQueue {
    fn enqueue(&self, value: i64) {
        FcQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<i64> {
        FcQueue::dequeue(self)
    }
}

/// Aggregate tallies of one driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Values successfully inserted.
    pub produced: usize,
    /// Values successfully removed.
    pub consumed: usize,
    /// Sum of inserted values.
    pub produced_sum: i64,
    /// Sum of removed values.
    pub consumed_sum: i64,
}

impl Outcome {
    /// `true` when every produced value was consumed exactly once.
    pub fn balanced(&self) -> bool {
        self.produced == self.consumed && self.produced_sum == self.consumed_sum
    }
}

enum Tally {
    Produced { count: usize, sum: i64 },
    Consumed { count: usize, sum: i64 },
}

/// Number of workers on each side of a producer/consumer split.
fn half_of(threads: usize) -> usize {
    assert!(threads > 0, "thread count must be positive");
    (threads / 2).max(1)
}

fn collect(rx: crossbeam_channel::Receiver<Tally>) -> Outcome {
    let mut outcome = Outcome {
        produced: 0,
        consumed: 0,
        produced_sum: 0,
        consumed_sum: 0,
    };
    for tally in rx {
        match tally {
            Tally::Produced { count, sum } => {
                outcome.produced += count;
                outcome.produced_sum += sum;
            }
            Tally::Consumed { count, sum } => {
                outcome.consumed += count;
                outcome.consumed_sum += sum;
            }
        }
    }
    outcome
}

/// Drives `queue` with `threads` workers split into enqueuing and dequeuing
/// halves over `values`.
///
/// Producer `i` enqueues every `half`-th value starting at offset `i`;
/// consumer `i` keeps dequeuing until it has collected as many values as
/// producer `i` inserted, so the container is drained at quiescence.
pub fn drive_queue<Q: ConcurrentQueue>(queue: &Q, values: &[i64], threads: usize) -> Outcome {
    let half = half_of(threads);
    let (tx, rx) = crossbeam_channel::unbounded();

    scope(|s| {
        for i in 0..half {
            let tx = tx.clone();
            s.spawn(move || {
                let mut count = 0;
                let mut sum = 0;
                for &value in values.iter().skip(i).step_by(half) {
                    queue.enqueue(value);
                    count += 1;
                    sum += value;
                }
                let _ = tx.send(Tally::Produced { count, sum });
            });
        }
        for i in 0..half {
            let tx = tx.clone();
            let quota = values.iter().skip(i).step_by(half).count();
            s.spawn(move || {
                let backoff = Backoff::new();
                let mut count = 0;
                let mut sum = 0;
                while count < quota {
                    match queue.dequeue() {
                        Some(value) => {
                            count += 1;
                            sum += value;
                            backoff.reset();
                        }
                        None => backoff.snooze(),
                    }
                }
                let _ = tx.send(Tally::Consumed { count, sum });
            });
        }
    });
    drop(tx);

    collect(rx)
}

/// Drives `stack` with `threads` workers split into pushing and popping
/// halves over `values`. Same split and quota scheme as [`drive_queue`].
pub fn drive_stack<S: ConcurrentStack>(stack: &S, values: &[i64], threads: usize) -> Outcome {
    let half = half_of(threads);
    let (tx, rx) = crossbeam_channel::unbounded();

    scope(|s| {
        for i in 0..half {
            let tx = tx.clone();
            s.spawn(move || {
                let mut count = 0;
                let mut sum = 0;
                for &value in values.iter().skip(i).step_by(half) {
                    stack.push(value);
                    count += 1;
                    sum += value;
                }
                let _ = tx.send(Tally::Produced { count, sum });
            });
        }
        for i in 0..half {
            let tx = tx.clone();
            let quota = values.iter().skip(i).step_by(half).count();
            s.spawn(move || {
                let backoff = Backoff::new();
                let mut count = 0;
                let mut sum = 0;
                while count < quota {
                    match stack.pop() {
                        Some(value) => {
                            count += 1;
                            sum += value;
                            backoff.reset();
                        }
                        None => backoff.snooze(),
                    }
                }
                let _ = tx.send(Tally::Consumed { count, sum });
            });
        }
    });
    drop(tx);

    collect(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_driver_balances() {
        let queue = SglQueue::new();
        let values: Vec<i64> = (1..=100).collect();
        let outcome = drive_queue(&queue, &values, 8);

        assert!(outcome.balanced());
        assert_eq!(outcome.produced, 100);
        assert_eq!(outcome.produced_sum, 5050);
        assert!(queue.is_empty());
    }

    #[test]
    fn stack_driver_balances() {
        let stack = SglStack::new();
        let values: Vec<i64> = (1..=100).collect();
        let outcome = drive_stack(&stack, &values, 8);

        assert!(outcome.balanced());
        assert_eq!(outcome.consumed, 100);
        assert!(stack.is_empty());
    }

    #[test]
    fn odd_thread_count_still_runs_both_sides() {
        let queue = SglQueue::new();
        let values: Vec<i64> = (1..=10).collect();
        let outcome = drive_queue(&queue, &values, 1);

        assert!(outcome.balanced());
    }
}
