//! Built-in stage implementations.

mod delay;
mod fault;
mod filter;
mod identity;
mod trace;

pub use delay::Delay;
pub use fault::FailEvery;
pub use filter::{DropEvery, Filter};
pub use identity::Identity;
pub use trace::Trace;

use crate::config::StageKind;
use crate::pipeline::error::StageResult;
use crate::pipeline::id::WorkerId;
use crate::pipeline::stage::Stage;
use std::fmt::Debug;
use std::time::Duration;

/// Enum dispatch for the stages a config file can name.
#[derive(Debug)]
pub enum BuiltinStage {
    Identity(Identity),
    Delay(Delay),
    Trace(Trace),
    DropEvery(DropEvery),
    FailEvery(FailEvery),
}

impl BuiltinStage {
    /// Build the stage described by `kind`; `label` prefixes its log lines.
    pub fn from_config(label: &str, kind: &StageKind) -> Self {
        match kind {
            StageKind::Identity => BuiltinStage::Identity(Identity),
            StageKind::Delay { millis } => {
                BuiltinStage::Delay(Delay::new(label, Duration::from_millis(*millis)))
            }
            StageKind::Trace => BuiltinStage::Trace(Trace::new(label)),
            StageKind::DropEvery { n } => BuiltinStage::DropEvery(DropEvery::new(*n)),
            StageKind::FailEvery { n } => BuiltinStage::FailEvery(FailEvery::new(*n)),
        }
    }
}

impl<T: Debug + Send> Stage<T> for BuiltinStage {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        match self {
            BuiltinStage::Identity(s) => s.process(item),
            BuiltinStage::Delay(s) => s.process(item),
            BuiltinStage::Trace(s) => s.process(item),
            BuiltinStage::DropEvery(s) => s.process(item),
            BuiltinStage::FailEvery(s) => s.process(item),
        }
    }

    fn on_start(&self, worker: WorkerId) {
        match self {
            BuiltinStage::Identity(s) => Stage::<T>::on_start(s, worker),
            BuiltinStage::Delay(s) => Stage::<T>::on_start(s, worker),
            BuiltinStage::Trace(s) => Stage::<T>::on_start(s, worker),
            BuiltinStage::DropEvery(s) => Stage::<T>::on_start(s, worker),
            BuiltinStage::FailEvery(s) => Stage::<T>::on_start(s, worker),
        }
    }

    fn on_stop(&self, worker: WorkerId) {
        match self {
            BuiltinStage::Identity(s) => Stage::<T>::on_stop(s, worker),
            BuiltinStage::Delay(s) => Stage::<T>::on_stop(s, worker),
            BuiltinStage::Trace(s) => Stage::<T>::on_stop(s, worker),
            BuiltinStage::DropEvery(s) => Stage::<T>::on_stop(s, worker),
            BuiltinStage::FailEvery(s) => Stage::<T>::on_stop(s, worker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::StageError;

    #[test]
    fn test_from_config_dispatch() {
        let delay = BuiltinStage::from_config("resize", &StageKind::Delay { millis: 0 });
        assert!(matches!(delay, BuiltinStage::Delay(ref d) if d.latency().is_zero()));
        assert_eq!(delay.process(5u64), Ok(Some(5)));

        let dropper = BuiltinStage::from_config("drop", &StageKind::DropEvery { n: 1 });
        assert_eq!(dropper.process(5u64), Ok(None));

        let failing = BuiltinStage::from_config("fail", &StageKind::FailEvery { n: 1 });
        assert!(matches!(failing.process(5u64), Err(StageError::Failed(_))));
    }
}
