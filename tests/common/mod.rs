//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod stage_helpers;

use std::time::{Duration, Instant};

/// Upper bound for waits that should finish quickly
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Short wait used to show something does NOT happen
pub fn short_wait() -> Duration {
    Duration::from_millis(100)
}

/// Poll `condition` until it holds or `timeout` expires
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
