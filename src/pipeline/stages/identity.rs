//! Identity: forwards every item unchanged.

use crate::pipeline::error::StageResult;
use crate::pipeline::stage::Stage;

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: Send> Stage<T> for Identity {
    #[inline]
    fn process(&self, item: T) -> StageResult<Option<T>> {
        Ok(Some(item))
    }
}
