//! Polling helpers
//!
//! Bounded waits driven by a predicate and a short sleep. Used where the
//! thing being waited on (a thread, a child process, a cooperative task)
//! offers no common blocking primitive.

use std::time::{Duration, Instant};

/// The predicate did not become true in time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitTimeout {
    pub waited: Duration,
}

/// Poll `condition` every `interval` until it holds or `timeout` passes
pub fn waiting_for<F>(mut condition: F, interval: Duration, timeout: Duration) -> Result<(), WaitTimeout>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(WaitTimeout { waited });
        }
        std::thread::sleep(interval.min(timeout - waited));
    }
}

/// Async twin of [`waiting_for`]; sleeping yields to the scheduler
pub async fn waiting_for_async<F>(
    mut condition: F,
    interval: Duration,
    timeout: Duration,
) -> Result<(), WaitTimeout>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(WaitTimeout { waited });
        }
        tokio::time::sleep(interval.min(timeout - waited)).await;
    }
}
