//! Deterministic fake clock.
//!
//! [`ManualScheduler`] only moves when told to. Tests drive reconnect
//! backoff, keepalive cadence and reply timeouts by calling
//! [`advance`](ManualScheduler::advance).
//!
//! # Example
//!
//! ```ignore
//! let scheduler = Arc::new(ManualScheduler::new());
//! let bus = EventBus::builder()
//!     .url("ws://bridge/eventbus")
//!     .connector(connector)
//!     .scheduler(scheduler.clone())
//!     .build()?;
//!
//! scheduler.advance(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{Scheduler, Task, TimerHandle};

// ============================================================================
// Types
// ============================================================================

/// A timer registered with the fake clock.
struct ManualTimer {
    id: u64,
    deadline: Duration,
    period: Option<Duration>,
    /// `None` while the task is running.
    task: Option<Task>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

// ============================================================================
// ManualScheduler
// ============================================================================

/// Scheduler whose clock advances only on request.
#[derive(Default, Clone)]
pub struct ManualScheduler {
    state: Arc<Mutex<ClockState>>,
}

impl ManualScheduler {
    /// Creates a clock at time zero with no timers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the elapsed fake time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of armed timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Returns the deadline of the next timer to fire, relative to now.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .timers
            .iter()
            .map(|t| t.deadline.saturating_sub(state.now))
            .min()
    }

    /// Advances the clock by `by`, firing every timer that comes due in
    /// deadline order.
    ///
    /// Tasks run without the clock locked, so they may schedule or cancel
    /// timers; timers armed by a task fire in the same call if they fall
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        while let Some((id, mut task)) = self.take_due(target) {
            task();
            self.restore(id, task);
        }

        self.state.lock().now = target;
    }

    /// Pops the earliest due timer, moving the clock to its deadline.
    fn take_due(&self, target: Duration) -> Option<(u64, Task)> {
        let mut state = self.state.lock();

        let index = state
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= target && t.task.is_some())
            .min_by_key(|(_, t)| (t.deadline, t.id))
            .map(|(i, _)| i)?;

        let deadline = state.timers[index].deadline;
        state.now = deadline;

        let timer = &mut state.timers[index];
        let id = timer.id;
        let task = timer.task.take()?;

        match timer.period {
            Some(period) => timer.deadline = deadline + period,
            None => {
                state.timers.swap_remove(index);
            }
        }

        trace!(id, at = ?deadline, "Fake timer fired");
        Some((id, task))
    }

    /// Puts a periodic task back unless it was cancelled while running.
    fn restore(&self, id: u64, task: Task) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timers.iter_mut().find(|t| t.id == id) {
            timer.task = Some(task);
        }
    }

    fn arm(&self, delay: Duration, period: Option<Duration>, task: Task) -> TimerHandle {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let deadline = state.now + delay;
            state.timers.push(ManualTimer {
                id,
                deadline,
                period,
                task: Some(task),
            });
            id
        };

        let state = Arc::clone(&self.state);
        TimerHandle::new(move || {
            state.lock().timers.retain(|t| t.id != id);
        })
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        self.arm(delay, None, task)
    }

    fn every(&self, period: Duration, task: Task) -> TimerHandle {
        if period.is_zero() {
            warn!("Refusing to schedule a zero-period timer");
            return TimerHandle::noop();
        }
        self.arm(period, Some(period), task)
    }
}

// ============================================================================
// Tests
// ============================================================================
