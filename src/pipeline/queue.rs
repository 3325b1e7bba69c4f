//! Closable FIFO queue with drain accounting.
//!
//! A `ClosableQueue` is a crossbeam channel of [`ChannelMsg`] plus an
//! outstanding-work counter:
//!
//! - `put` and `close` increment the counter before the message is sent.
//! - Consumers decrement it with `task_done`, or implicitly through the
//!   [`Consume`] iterator returned by [`ClosableQueue::consume`].
//! - `join` blocks until the counter returns to zero.
//!
//! `close` enqueues one sentinel. It is not idempotent: a queue with `n`
//! consumers must be closed `n` times or some consumers never terminate.
//!
//! Every queue belongs to a [`CancelToken`]. Cancelling the token wakes
//! blocked producers, ends all consumer sequences and makes `join` fail.

use crate::pipeline::cancel::{lock, CancelToken, CancelWaiter};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::ChannelMsg;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Weak};
use std::time::{Duration, Instant};

/// Lifecycle of a queue. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    /// No sentinel has been enqueued.
    Open,
    /// At least one sentinel is enqueued; work is still outstanding.
    Closing,
    /// Closed and every message, sentinels included, has been marked done.
    Drained,
}

#[derive(Debug)]
struct Accounting {
    unfinished: usize,
    sentinels: usize,
    state: QueueState,
}

struct QueueShared {
    accounting: std::sync::Mutex<Accounting>,
    all_done: Condvar,
    cancel: CancelToken,
}

impl QueueShared {
    fn reserve(&self, sentinel: bool) {
        let mut acc = lock(&self.accounting);
        acc.unfinished += 1;
        if sentinel {
            acc.sentinels += 1;
            if acc.state == QueueState::Open {
                acc.state = QueueState::Closing;
            }
        }
    }

    /// Undo a `reserve` whose message never made it into the channel.
    fn unreserve(&self, sentinel: bool) {
        let mut acc = lock(&self.accounting);
        acc.unfinished = acc.unfinished.saturating_sub(1);
        if sentinel {
            acc.sentinels = acc.sentinels.saturating_sub(1);
        }
        self.settle(&mut acc);
    }

    fn task_done(&self) -> PipelineResult<()> {
        let mut acc = lock(&self.accounting);
        if acc.unfinished == 0 {
            return Err(PipelineError::TaskDoneOverflow);
        }
        acc.unfinished -= 1;
        self.settle(&mut acc);
        Ok(())
    }

    fn settle(&self, acc: &mut Accounting) {
        if acc.unfinished == 0 {
            if acc.state == QueueState::Closing {
                acc.state = QueueState::Drained;
            }
            self.all_done.notify_all();
        }
    }
}

impl CancelWaiter for QueueShared {
    fn wake(&self) {
        let _acc = lock(&self.accounting);
        self.all_done.notify_all();
    }
}

/// Multi-producer, multi-consumer closable queue. Clones share the same queue.
pub struct ClosableQueue<T> {
    tx: Sender<ChannelMsg<T>>,
    rx: Receiver<ChannelMsg<T>>,
    shared: Arc<QueueShared>,
    capacity: Option<usize>,
}

impl<T> Clone for ClosableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
    }
}

impl<T> ClosableQueue<T> {
    /// Unbounded queue with its own cancellation token.
    pub fn unbounded() -> Self {
        Self::with_token(0, CancelToken::new())
    }

    /// Queue holding at most `capacity` messages (sentinels included).
    pub fn bounded(capacity: usize) -> Self {
        Self::with_token(capacity.max(1), CancelToken::new())
    }

    /// Queue attached to an existing token. `capacity == 0` means unbounded.
    pub fn with_token(capacity: usize, cancel: CancelToken) -> Self {
        let (tx, rx) = if capacity == 0 {
            unbounded()
        } else {
            bounded(capacity)
        };
        let shared = Arc::new(QueueShared {
            accounting: std::sync::Mutex::new(Accounting {
                unfinished: 0,
                sentinels: 0,
                state: QueueState::Open,
            }),
            all_done: Condvar::new(),
            cancel: cancel.clone(),
        });
        let waiter: Weak<QueueShared> = Arc::downgrade(&shared);
        cancel.register(waiter);

        Self {
            tx,
            rx,
            shared,
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    /// Enqueue an item at the tail. Blocks while a bounded queue is full.
    pub fn put(&self, item: T) -> PipelineResult<()> {
        self.send(ChannelMsg::Data(item))
    }

    /// Enqueue without blocking; fails with `QueueFull` if there is no room.
    pub fn try_put(&self, item: T) -> PipelineResult<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.shared.reserve(false);
        match self.tx.try_send(ChannelMsg::Data(item)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.shared.unreserve(false);
                Err(PipelineError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.unreserve(false);
                Err(PipelineError::ChannelSend)
            }
        }
    }

    /// Enqueue one shutdown sentinel.
    pub fn close(&self) -> PipelineResult<()> {
        self.send(ChannelMsg::Shutdown)
    }

    fn send(&self, msg: ChannelMsg<T>) -> PipelineResult<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let sentinel = msg.is_shutdown();
        self.shared.reserve(sentinel);

        let result = select! {
            send(self.tx, msg) -> res => res.map_err(|_| PipelineError::ChannelSend),
            recv(self.shared.cancel.signal()) -> _ => Err(PipelineError::Cancelled),
        };
        if result.is_err() {
            self.shared.unreserve(sentinel);
        }
        result
    }

    /// Dequeue one raw message, blocking until one is available.
    ///
    /// The caller owns the accounting for it and must call
    /// [`task_done`](Self::task_done) once the message is handled.
    pub fn get(&self) -> PipelineResult<ChannelMsg<T>> {
        if self.shared.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| PipelineError::ChannelRecv),
            recv(self.shared.cancel.signal()) -> _ => Err(PipelineError::Cancelled),
        }
    }

    /// Mark one previously dequeued message as completed.
    pub fn task_done(&self) -> PipelineResult<()> {
        self.shared.task_done()
    }

    /// Lazy sequence of items that ends at the first sentinel.
    ///
    /// Each item is marked done when the iterator is advanced past it or
    /// dropped. The sentinel is marked done as soon as it is observed and is
    /// never yielded.
    pub fn consume(&self) -> Consume<T> {
        Consume {
            rx: self.rx.clone(),
            shared: Arc::clone(&self.shared),
            in_flight: false,
            finished: false,
            saw_sentinel: false,
        }
    }

    /// Block until every enqueued message has been marked done.
    pub fn join(&self) -> PipelineResult<()> {
        let mut acc = lock(&self.shared.accounting);
        loop {
            if acc.unfinished == 0 {
                return Ok(());
            }
            if self.shared.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            acc = self
                .shared
                .all_done
                .wait(acc)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    ///
    /// Returns `Ok(true)` when drained and `Ok(false)` on timeout.
    pub fn join_timeout(&self, timeout: Duration) -> PipelineResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut acc = lock(&self.shared.accounting);
        loop {
            if acc.unfinished == 0 {
                return Ok(true);
            }
            if self.shared.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            acc = self
                .shared
                .all_done
                .wait_timeout(acc, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    pub fn state(&self) -> QueueState {
        lock(&self.shared.accounting).state
    }

    /// Messages currently buffered, sentinels included.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Messages enqueued but not yet marked done.
    pub fn unfinished(&self) -> usize {
        lock(&self.shared.accounting).unfinished
    }

    /// Number of sentinels enqueued so far.
    pub fn sentinels(&self) -> usize {
        lock(&self.shared.accounting).sentinels
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.shared.cancel
    }
}

impl<T> std::fmt::Debug for ClosableQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let acc = lock(&self.shared.accounting);
        f.debug_struct("ClosableQueue")
            .field("len", &self.rx.len())
            .field("capacity", &self.capacity)
            .field("unfinished", &acc.unfinished)
            .field("sentinels", &acc.sentinels)
            .field("state", &acc.state)
            .finish()
    }
}

/// Consumer-side iterator over a [`ClosableQueue`]. Not restartable.
pub struct Consume<T> {
    rx: Receiver<ChannelMsg<T>>,
    shared: Arc<QueueShared>,
    /// An item has been yielded and not yet marked done.
    in_flight: bool,
    finished: bool,
    saw_sentinel: bool,
}

impl<T> Consume<T> {
    fn complete_in_flight(&mut self) {
        if std::mem::take(&mut self.in_flight) {
            if let Err(e) = self.shared.task_done() {
                tracing::warn!("Queue accounting out of sync: {}", e);
            }
        }
    }

    /// Whether the sequence has ended (sentinel seen or pipeline cancelled).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the sequence ended because a sentinel was dequeued.
    pub fn saw_sentinel(&self) -> bool {
        self.saw_sentinel
    }
}

impl<T> Iterator for Consume<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.complete_in_flight();
        if self.finished {
            return None;
        }
        if self.shared.cancel.is_cancelled() {
            self.finished = true;
            return None;
        }

        let msg = select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(self.shared.cancel.signal()) -> _ => None,
        };

        match msg {
            Some(ChannelMsg::Data(item)) => {
                self.in_flight = true;
                Some(item)
            }
            Some(ChannelMsg::Shutdown) => {
                self.finished = true;
                self.saw_sentinel = true;
                if let Err(e) = self.shared.task_done() {
                    tracing::warn!("Queue accounting out of sync: {}", e);
                }
                None
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl<T> Drop for Consume<T> {
    fn drop(&mut self) {
        self.complete_in_flight();
    }
}
