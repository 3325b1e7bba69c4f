//! Dropping stages.
//!
//! `Filter` keeps items matching a predicate. `DropEvery` drops every n-th item
//! it sees, counted across all workers of its stage.

use crate::pipeline::error::StageResult;
use crate::pipeline::stage::Stage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Keeps items for which the predicate holds.
pub struct Filter<P> {
    predicate: P,
}

impl<P> Filter<P> {
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

impl<T, P> Stage<T> for Filter<P>
where
    T: Send,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn process(&self, item: T) -> StageResult<Option<T>> {
        Ok((self.predicate)(&item).then_some(item))
    }
}

/// Drops every n-th item. `n == 0` never drops.
#[derive(Debug, Default)]
pub struct DropEvery {
    n: u64,
    seen: AtomicU64,
}

impl DropEvery {
    pub fn new(n: u64) -> Self {
        Self {
            n,
            seen: AtomicU64::new(0),
        }
    }
}

impl<T: Send> Stage<T> for DropEvery {
    fn process(&self, item: T) -> StageResult<Option<T>> {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if self.n != 0 && seen % self.n == 0 {
            Ok(None)
        } else {
            Ok(Some(item))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_keeps_matching() {
        let odd = Filter::new(|x: &u32| x % 2 == 1);
        assert_eq!(odd.process(3), Ok(Some(3)));
        assert_eq!(odd.process(4), Ok(None));
    }

    #[test]
    fn test_drop_every_third() {
        let stage = DropEvery::new(3);
        let kept: Vec<u32> = (1..=9)
            .filter_map(|i| stage.process(i).unwrap())
            .collect();
        assert_eq!(kept, vec![1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn test_drop_every_zero_is_passthrough() {
        let stage = DropEvery::new(0);
        assert!((0..10u32).all(|i| stage.process(i) == Ok(Some(i))));
    }
}
