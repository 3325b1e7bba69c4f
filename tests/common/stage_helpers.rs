//! Stage helpers shared by the integration tests

use closable_pipeline::pipeline::{Stage, StageResult, WorkerId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;
use std::time::Duration;

/// Forwards items and records which threads and workers handled them
#[derive(Default)]
pub struct Recording {
    pub threads: Mutex<HashSet<ThreadId>>,
    pub started: Mutex<Vec<WorkerId>>,
    pub stopped: AtomicUsize,
    pub latency: Option<Duration>,
}

impl Recording {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }
}

impl<T: Send> Stage<T> for Recording {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        self.threads.lock().unwrap().insert(std::thread::current().id());
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        Ok(Some(item))
    }

    fn on_start(&self, worker: WorkerId) {
        self.started.lock().unwrap().push(worker);
    }

    fn on_stop(&self, _worker: WorkerId) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}
