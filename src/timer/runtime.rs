//! Tokio-backed [`Scheduler`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::warn;

use crate::error::{Error, Result};

use super::{Scheduler, Task, TimerHandle};

// ============================================================================
// TokioScheduler
// ============================================================================

/// Runs timers as tokio tasks; cancellation aborts the task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime available: {e}")))?;
        Ok(Self { handle })
    }

    /// Creates a scheduler on an explicit runtime handle.
    #[inline]
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, mut task: Task) -> TimerHandle {
        let join = self.handle.spawn(async move {
            sleep(delay).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }

    fn every(&self, period: Duration, mut task: Task) -> TimerHandle {
        if period.is_zero() {
            warn!("Refusing to schedule a zero-period timer");
            return TimerHandle::noop();
        }

        let join = self.handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

// ============================================================================
// Tests
// ============================================================================
