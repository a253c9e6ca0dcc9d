//! Bounded condition-variable waits.
//!
//! Every blocking call in tickpipe takes an `Option<Duration>` where `None`
//! waits forever. [`wait_while`] turns that into a single loop that re-checks
//! its predicate after every wake, so coalesced or spurious notifications
//! are harmless.

use std::sync::{Condvar, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predicate stopped holding.
    Ready,
    /// The timeout elapsed while the predicate still held.
    TimedOut,
}

/// Blocks on `condvar` while `condition` returns true, for at most `timeout`.
///
/// Poisoned locks are recovered; callers keep their state consistent
/// before releasing the guard.
pub fn wait_while<'a, T, F>(
    condvar: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Option<Duration>,
    mut condition: F,
) -> (MutexGuard<'a, T>, WaitOutcome)
where
    F: FnMut(&mut T) -> bool,
{
    let Some(timeout) = timeout else {
        let guard = condvar
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner);
        return (guard, WaitOutcome::Ready);
    };

    let deadline = Instant::now().checked_add(timeout);
    while condition(&mut *guard) {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        if remaining.is_zero() {
            return (guard, WaitOutcome::TimedOut);
        }
        guard = condvar
            .wait_timeout(guard, remaining)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
    (guard, WaitOutcome::Ready)
}
