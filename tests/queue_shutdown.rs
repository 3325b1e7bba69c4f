//! Integration tests for closable queue shutdown
//!
//! These tests pin down the sentinel protocol directly on queues:
//! - One sentinel per consumer ends a fan-out group
//! - Too few sentinels leave a consumer blocked (a reproducible failure)
//! - Ordered drain across two chained queues loses nothing

mod common;

use closable_pipeline::pipeline::{ChannelMsg, ClosableQueue, PipelineError, QueueState};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

fn spawn_consumer(
    queue: &ClosableQueue<u32>,
    seen: &Arc<Mutex<Vec<u32>>>,
) -> JoinHandle<()> {
    let queue = queue.clone();
    let seen = Arc::clone(seen);
    thread::spawn(move || {
        for item in queue.consume() {
            seen.lock().unwrap().push(item);
        }
    })
}

#[test]
fn test_two_consumers_need_two_sentinels() {
    let queue = ClosableQueue::unbounded();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = spawn_consumer(&queue, &seen);
    let second = spawn_consumer(&queue, &seen);

    for item in 0..20 {
        queue.put(item).unwrap();
    }
    queue.close().unwrap();

    // Exactly one consumer can take the single sentinel
    assert!(common::wait_until(common::test_timeout(), || {
        first.is_finished() || second.is_finished()
    }));
    thread::sleep(common::short_wait());
    assert!(
        !(first.is_finished() && second.is_finished()),
        "one consumer must still be blocked waiting for its sentinel"
    );
    assert_eq!(queue.state(), QueueState::Drained);

    queue.close().unwrap();
    first.join().unwrap();
    second.join().unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
    assert_eq!(queue.sentinels(), 2);
    assert_eq!(queue.unfinished(), 0);
}

#[test]
fn test_join_waits_for_consumer_processing() {
    let queue = ClosableQueue::unbounded();
    for item in 0..5u32 {
        queue.put(item).unwrap();
    }
    queue.close().unwrap();
    assert_eq!(queue.state(), QueueState::Closing);

    // Nobody consumes yet, so the drain cannot complete
    assert_eq!(queue.join_timeout(common::short_wait()), Ok(false));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let consumer = spawn_consumer(&queue, &seen);
    queue.join().unwrap();
    consumer.join().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.state(), QueueState::Drained);
}

#[test]
fn test_ordered_drain_across_chained_queues() {
    let upstream = ClosableQueue::bounded(4);
    let downstream: ClosableQueue<u32> = ClosableQueue::bounded(4);

    let relay = {
        let upstream = upstream.clone();
        let downstream = downstream.clone();
        thread::spawn(move || {
            for item in upstream.consume() {
                downstream.put(item * 10).unwrap();
            }
        })
    };
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = spawn_consumer(&downstream, &seen);

    for item in 1..=50u32 {
        upstream.put(item).unwrap();
    }
    upstream.close().unwrap();
    upstream.join().unwrap();

    // Every upstream item is already forwarded when the downstream sentinel goes in
    downstream.close().unwrap();
    downstream.join().unwrap();
    relay.join().unwrap();
    collector.join().unwrap();

    let expected: Vec<u32> = (1..=50).map(|x| x * 10).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn test_raw_get_with_manual_task_done() {
    let queue = ClosableQueue::unbounded();
    queue.put(7u32).unwrap();
    queue.close().unwrap();

    match queue.get().unwrap() {
        ChannelMsg::Data(item) => assert_eq!(item, 7),
        ChannelMsg::Shutdown => panic!("data must come before the sentinel"),
    }
    queue.task_done().unwrap();
    assert!(queue.get().unwrap().is_shutdown());
    queue.task_done().unwrap();

    assert_eq!(queue.join(), Ok(()));
    assert_eq!(queue.task_done(), Err(PipelineError::TaskDoneOverflow));
}

#[test]
fn test_cancel_releases_starved_consumer() {
    let queue = ClosableQueue::unbounded();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = spawn_consumer(&queue, &seen);
    let second = spawn_consumer(&queue, &seen);
    queue.close().unwrap();

    assert!(common::wait_until(common::test_timeout(), || {
        first.is_finished() || second.is_finished()
    }));

    // The remaining consumer ends on cancellation instead of hanging
    assert!(queue.cancel_token().cancel());
    first.join().unwrap();
    second.join().unwrap();
    assert_eq!(queue.put(1), Err(PipelineError::Cancelled));
}
