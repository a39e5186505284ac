//! Timer scheduling.
//!
//! The bus never sleeps or spawns on its own. Reconnect delays, keepalive
//! pings and reply timeouts go through a [`Scheduler`], so the connection
//! manager can run on tokio in production and on a fake clock in tests.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `runtime` | [`TokioScheduler`] backed by tokio tasks |
//! | `manual` | [`ManualScheduler`], a deterministic fake clock |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

// ============================================================================
// Submodules
// ============================================================================

/// Deterministic fake clock.
pub mod manual;

/// Tokio-backed scheduler.
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

// ============================================================================
// Types
// ============================================================================

/// Work run when a timer fires.
pub type Task = Box<dyn FnMut() + Send + 'static>;

// ============================================================================
// Scheduler
// ============================================================================

/// Timer facility used by the bus.
///
/// Implementations must never run `task` synchronously from inside
/// [`after`](Scheduler::after) or [`every`](Scheduler::every): the bus
/// schedules timers while holding its own lock.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay`.
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Runs `task` every `period`, first firing one `period` from now.
    ///
    /// A zero period schedules nothing.
    fn every(&self, period: Duration, task: Task) -> TimerHandle;
}

// ============================================================================
// TimerHandle
// ============================================================================

/// Cancellation handle for a scheduled timer.
///
/// Dropping the handle detaches the timer; only [`cancel`](Self::cancel)
/// stops it.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Creates a handle that runs `cancel` when cancelled.
    #[inline]
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a handle for a timer that was never armed.
    #[inline]
    #[must_use]
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Cancels the timer. Cancelling a timer that already fired is a no-op.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_cancel_runs_callback_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        TimerHandle::new(move || flag.store(true, Ordering::SeqCst)).cancel();
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        drop(TimerHandle::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_noop_handle() {
        let handle = TimerHandle::noop();
        assert_eq!(format!("{handle:?}"), "TimerHandle { armed: false }");
        handle.cancel();
    }
}
