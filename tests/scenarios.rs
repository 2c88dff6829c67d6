//! End-to-end scenarios exercising every container through the public
//! surface, from single-thread ordering checks to producer/consumer sweeps.

use std::collections::HashSet;
use std::thread::scope;
use std::time::Duration;

use conc_containers::{
    drive_queue, drive_stack, ElimStack, FcQueue, FcStack, MsQueue, SglQueue, SglStack,
    StampedStack, TreiberStack,
};

#[test]
fn treiber_stack_pops_in_reverse() {
    let stack = TreiberStack::new();
    stack.push(1);
    stack.push(2);
    stack.push(3);

    assert_eq!(stack.pop(), Some(3));
    assert_eq!(stack.pop(), Some(2));
    assert_eq!(stack.pop(), Some(1));
    assert_eq!(stack.pop(), None);
}

#[test]
fn ms_queue_dequeues_in_order() {
    let queue = MsQueue::new();
    queue.enqueue(1);
    queue.enqueue(2);
    queue.enqueue(3);

    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), Some(3));
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn sgl_queue_five_producers_five_consumers() {
    let queue = SglQueue::new();
    let values: Vec<i64> = (1..=5).collect();
    let outcome = drive_queue(&queue, &values, 10);

    assert_eq!(outcome.consumed_sum, 15);
    assert!(outcome.balanced());
}

#[test]
fn ms_queue_hundred_producers_hundred_consumers() {
    let queue = MsQueue::new();
    let values: Vec<i64> = (1..=100).collect();
    let outcome = drive_queue(&queue, &values, 200);

    assert_eq!(outcome.consumed_sum, 5050);
    assert!(outcome.balanced());
    assert!(queue.is_empty());
}

/// Threads alternate push and pop on an elimination stack; every pop must
/// return a previously pushed value, and at quiescence pops cannot outnumber
/// pushes.
#[test]
fn elimination_stack_mixed_workload() {
    const THREADS: i64 = 16;
    const PER_THREAD: i64 = 1_000;

    let stack: ElimStack<TreiberStack> = ElimStack::with_delay(5, Duration::from_micros(50));

    let (tx, rx) = crossbeam_channel::unbounded();
    scope(|s| {
        for t in 0..THREADS {
            let stack = &stack;
            let tx = tx.clone();
            s.spawn(move || {
                let mut pushed = Vec::new();
                let mut popped = Vec::new();
                for i in 0..PER_THREAD {
                    if t % 2 == 0 {
                        let value = t * PER_THREAD + i;
                        stack.push(value);
                        pushed.push(value);
                    } else if let Some(value) = stack.pop() {
                        popped.push(value);
                    }
                }
                let _ = tx.send((pushed, popped));
            });
        }
    });
    drop(tx);

    let mut pushed = HashSet::new();
    let mut popped = Vec::new();
    for (p, c) in rx {
        pushed.extend(p);
        popped.extend(c);
    }

    assert!(popped.len() <= pushed.len());
    for value in &popped {
        assert!(pushed.contains(value), "popped a value nobody pushed");
    }

    // Drain what is left; everything must be accounted for exactly once.
    while let Some(value) = stack.pop() {
        popped.push(value);
    }
    assert_eq!(popped.len(), pushed.len());
}

#[test]
fn flat_combining_queue_sum_matches_input() {
    let values: Vec<i64> = (1..=500).collect();
    let expected: i64 = values.iter().sum();

    let queue = FcQueue::new(8);
    let outcome = drive_queue(&queue, &values, 8);

    assert_eq!(outcome.consumed_sum, expected);
    assert!(outcome.balanced());
}

#[test]
fn flat_combining_stack_balances() {
    let values: Vec<i64> = (1..=500).collect();

    let stack = FcStack::new(8);
    let outcome = drive_stack(&stack, &values, 8);

    assert!(outcome.balanced());
}

#[test]
fn stamped_stack_under_recycling_pressure() {
    // Tight push/pop cycles drive allocator reuse of just-freed nodes, the
    // classic ABA trigger.
    let stack = StampedStack::new();

    scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for i in 0..20_000 {
                    stack.push(i);
                    assert!(stack.pop().is_some());
                }
            });
        }
    });

    assert!(stack.is_empty());
}

#[test]
fn elimination_over_sgl_stack_balances() {
    let stack: ElimStack<SglStack> = ElimStack::with_delay(5, Duration::from_micros(50));
    let values: Vec<i64> = (1..=200).collect();
    let outcome = drive_stack(&stack, &values, 8);

    assert!(outcome.balanced());
}

#[test]
fn random_ops_match_reference_stack() {
    use rand::{thread_rng, Rng};

    let mut rng = thread_rng();
    let stack = TreiberStack::new();
    let stamped = StampedStack::new();
    let mut reference: Vec<i64> = Vec::new();

    for _ in 0..10_000 {
        if rng.gen::<bool>() {
            let value = rng.gen_range(0..1_000);
            stack.push(value);
            stamped.push(value);
            reference.push(value);
        } else {
            let expected = reference.pop();
            assert_eq!(stack.pop(), expected);
            assert_eq!(stamped.pop(), expected);
        }
    }
}

#[test]
fn random_ops_match_reference_queue() {
    use rand::{thread_rng, Rng};
    use std::collections::VecDeque;

    let mut rng = thread_rng();
    let queue = MsQueue::new();
    let mut reference: VecDeque<i64> = VecDeque::new();

    for _ in 0..10_000 {
        if rng.gen::<bool>() {
            let value = rng.gen_range(0..1_000);
            queue.enqueue(value);
            reference.push_back(value);
        } else {
            assert_eq!(queue.dequeue(), reference.pop_front());
        }
    }
}

#[test]
fn every_stack_agrees_on_a_sequential_history() {
    let values: Vec<i64> = (0..50).collect();

    let treiber = TreiberStack::new();
    let stamped = StampedStack::new();
    let sgl = SglStack::new();

    for &v in &values {
        treiber.push(v);
        stamped.push(v);
        sgl.push(v);
    }
    for &v in values.iter().rev() {
        assert_eq!(treiber.pop(), Some(v));
        assert_eq!(stamped.pop(), Some(v));
        assert_eq!(sgl.pop(), Some(v));
    }
}
