//! Poll-until-true and retry-on-error primitives.
//!
//! Every blocking operation in the engine funnels through these helpers. They sleep between
//! attempts (never spin), measure elapsed time on the monotonic clock, and always evaluate the
//! condition at least once, so a zero timeout means "try exactly once".
//!
//! [`wait_until`] and friends never fail: absence of success is reported as `false` and the caller
//! decides whether that becomes an error. A panicking predicate is not caught. [`retry`] is the
//! separate retry-on-error contract layered on the same deadline handling.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

/// Floor applied to poll intervals so a zero interval still yields to other tasks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Absolute point on the monotonic clock after which waiting stops.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Sleep length before the next attempt, or `None` once the deadline has passed.
    fn pause(&self, poll_interval: Duration) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.at {
            return None;
        }
        let remaining = self.at - now;
        Some(poll_interval.max(MIN_POLL_INTERVAL).min(remaining))
    }
}

/// Poll `predicate` until it returns `true` or `timeout` elapses.
pub async fn wait_until<F>(mut predicate: F, timeout: Duration, poll_interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Deadline::after(timeout);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if predicate() {
            return true;
        }
        match deadline.pause(poll_interval) {
            Some(pause) => sleep(pause).await,
            None => {
                trace!(target: "wait", ?timeout, attempts, "condition not met before deadline");
                return false;
            }
        }
    }
}

/// Like [`wait_until`], passing the subject explicitly to every attempt instead of capturing it.
pub async fn wait_until_with<T, F>(
    input: &T,
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> bool
where
    T: ?Sized,
    F: FnMut(&T) -> bool,
{
    wait_until(|| predicate(input), timeout, poll_interval).await
}

/// Poll an asynchronous predicate, e.g. one that queries the remote target.
pub async fn wait_until_async<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Deadline::after(timeout);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if predicate().await {
            return true;
        }
        match deadline.pause(poll_interval) {
            Some(pause) => sleep(pause).await,
            None => {
                trace!(target: "wait", ?timeout, attempts, "async condition not met before deadline");
                return false;
            }
        }
    }
}

/// Asynchronous counterpart of [`wait_until_with`]; the predicate's future may borrow `input`.
pub async fn wait_until_async_with<'a, T, F, Fut>(
    input: &'a T,
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> bool
where
    T: ?Sized,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = bool> + 'a,
{
    wait_until_async(|| predicate(input), timeout, poll_interval).await
}

/// Thread-blocking variant for callers that do not run inside an async runtime.
pub fn wait_until_blocking<F>(mut predicate: F, timeout: Duration, poll_interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    loop {
        if predicate() {
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return false;
        }
        let pause = poll_interval
            .max(MIN_POLL_INTERVAL)
            .min(timeout - elapsed);
        std::thread::sleep(pause);
    }
}

/// Run `op` until it succeeds or `timeout` elapses, sleeping `backoff` between failures.
///
/// `op` runs at least once. On expiry the error of the final attempt is returned.
pub async fn retry<T, E, F, Fut>(timeout: Duration, backoff: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let deadline = Deadline::after(timeout);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => match deadline.pause(backoff) {
                Some(pause) => sleep(pause).await,
                None => {
                    trace!(target: "wait", ?timeout, attempts, "retry budget exhausted");
                    return Err(err);
                }
            },
        }
    }
}
