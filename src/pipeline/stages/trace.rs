//! Trace: logs every item and forwards it (the upload step of the demo).

use crate::pipeline::error::StageResult;
use crate::pipeline::id::WorkerId;
use crate::pipeline::stage::Stage;
use std::fmt::Debug;

#[derive(Debug, Clone)]
pub struct Trace {
    label: String,
}

impl Trace {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl<T: Debug + Send> Stage<T> for Trace {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        tracing::debug!("{} item {:?}", self.label, item);
        Ok(Some(item))
    }

    fn on_stop(&self, worker: WorkerId) {
        tracing::trace!("{} finished on {}", self.label, worker);
    }
}
