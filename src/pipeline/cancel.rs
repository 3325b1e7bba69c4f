//! Pipeline-wide cancellation.
//!
//! A `CancelToken` is shared by every queue of one pipeline. Cancelling it:
//! - disconnects the signal channel, so any `select!` waiting on
//!   [`CancelToken::signal`] wakes immediately;
//! - wakes every registered waiter (queue `join` calls).
//!
//! Cancellation is one-way; a cancelled token never resets.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Something blocked on a condition that must also observe cancellation.
pub(crate) trait CancelWaiter: Send + Sync {
    fn wake(&self);
}

struct CancelInner {
    cancelled: AtomicBool,
    /// Dropped on cancel; never used to send.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    waiters: Mutex<Vec<Weak<dyn CancelWaiter>>>,
}

/// Cloneable handle to a shared cancellation flag.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the token. Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        drop(lock(&self.inner.trigger).take());

        let waiters = std::mem::take(&mut *lock(&self.inner.waiters));
        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            waiter.wake();
        }
        true
    }

    /// Receiver that disconnects when the token is cancelled. Use in `select!`.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    pub(crate) fn register(&self, waiter: Weak<dyn CancelWaiter>) {
        let mut waiters = lock(&self.inner.waiters);
        waiters.retain(|w| w.strong_count() > 0);
        waiters.push(waiter);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
