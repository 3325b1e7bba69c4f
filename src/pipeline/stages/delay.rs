//! Delay: simulates a stage with fixed latency (a download or a resize).

use crate::pipeline::error::StageResult;
use crate::pipeline::stage::Stage;
use std::fmt::Debug;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Delay {
    label: String,
    latency: Duration,
}

impl Delay {
    pub fn new(label: impl Into<String>, latency: Duration) -> Self {
        Self {
            label: label.into(),
            latency,
        }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

impl<T: Debug + Send> Stage<T> for Delay {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        tracing::debug!("{} item {:?}", self.label, item);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(Some(item))
    }
}
