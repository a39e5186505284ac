//! Keepalive driver.
//!
//! The bridge drops sockets that stay silent, so while the bus is open it
//! pings once immediately and then once per interval.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::debug;

use crate::timer::{Scheduler, Task, TimerHandle};

// ============================================================================
// Keepalive
// ============================================================================

/// Owns the recurring ping timer.
#[derive(Debug)]
pub(crate) struct Keepalive {
    interval: Duration,
    timer: Option<TimerHandle>,
}

impl Keepalive {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
        }
    }

    /// Arms the recurring timer, replacing any previous one.
    ///
    /// Returns `false` when pings are disabled; the caller sends the first
    /// ping itself only when this returns `true`.
    pub(crate) fn start(&mut self, scheduler: &dyn Scheduler, tick: Task) -> bool {
        self.stop();

        if self.interval.is_zero() {
            return false;
        }

        self.timer = Some(scheduler.every(self.interval, tick));
        debug!(interval = ?self.interval, "Keepalive started");
        true
    }

    /// Cancels the recurring timer, if any.
    pub(crate) fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
            debug!("Keepalive stopped");
        }
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.timer.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::timer::ManualScheduler;

    fn ticker() -> (Arc<AtomicUsize>, Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_ticks_every_interval() {
        let clock = ManualScheduler::new();
        let mut keepalive = Keepalive::new(Duration::from_millis(5000));
        let (count, tick) = ticker();

        assert!(keepalive.start(&clock, tick));
        assert!(keepalive.is_running());

        clock.advance(Duration::from_millis(4999));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(10_001));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_cancels_timer() {
        let clock = ManualScheduler::new();
        let mut keepalive = Keepalive::new(Duration::from_millis(100));
        let (count, tick) = ticker();

        keepalive.start(&clock, tick);
        keepalive.stop();
        assert!(!keepalive.is_running());

        clock.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_disabled() {
        let clock = ManualScheduler::new();
        let mut keepalive = Keepalive::new(Duration::ZERO);
        let (_count, tick) = ticker();

        assert!(!keepalive.start(&clock, tick));
        assert!(!keepalive.is_running());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_restart_replaces_timer() {
        let clock = ManualScheduler::new();
        let mut keepalive = Keepalive::new(Duration::from_millis(100));
        let (first, tick) = ticker();
        let (second, tick2) = ticker();

        keepalive.start(&clock, tick);
        keepalive.start(&clock, tick2);
        assert_eq!(clock.pending(), 1);

        clock.advance(Duration::from_millis(100));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
