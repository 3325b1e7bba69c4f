//! FailEvery: raises a stage fault on every n-th item. Used to exercise the
//! pipeline's fault policies.

use crate::pipeline::error::{StageError, StageResult};
use crate::pipeline::stage::Stage;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FailEvery {
    n: u64,
    seen: AtomicU64,
}

impl FailEvery {
    /// `n == 0` never fails.
    pub fn new(n: u64) -> Self {
        Self {
            n,
            seen: AtomicU64::new(0),
        }
    }
}

impl<T: Debug + Send> Stage<T> for FailEvery {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if self.n != 0 && seen % self.n == 0 {
            Err(StageError::Failed(format!("injected fault on item {:?}", item)))
        } else {
            Ok(Some(item))
        }
    }
}
