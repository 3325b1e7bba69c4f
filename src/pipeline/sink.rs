//! Terminal sink and the `Outlet` seam workers write to.
//!
//! The last stage of a pipeline writes into a plain [`SinkQueue`] that is never
//! closed; every other stage writes into the next stage's [`ClosableQueue`].

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::queue::ClosableQueue;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Destination for items a worker forwards.
pub trait Outlet<T>: Send + Sync {
    fn put(&self, item: T) -> PipelineResult<()>;
}

impl<T: Send> Outlet<T> for ClosableQueue<T> {
    fn put(&self, item: T) -> PipelineResult<()> {
        ClosableQueue::put(self, item)
    }
}

/// Unbounded FIFO collecting pipeline output. Clones share the same buffer.
pub struct SinkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for SinkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> SinkQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drain all buffered items in arrival order.
    pub fn drain(&self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.rx.len());
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T> Default for SinkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Outlet<T> for SinkQueue<T> {
    fn put(&self, item: T) -> PipelineResult<()> {
        self.tx.send(item).map_err(|_| PipelineError::ChannelSend)
    }
}
