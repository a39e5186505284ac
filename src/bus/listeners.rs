//! Connection-level event listeners.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::protocol::Failure;
use crate::transport::CloseEvent;

// ============================================================================
// Listener Types
// ============================================================================

/// Called when the bus reaches OPEN.
pub type OpenListener = Arc<dyn Fn() + Send + Sync>;

/// Called after [`OpenListener`] when the open followed a reconnect.
pub type ReconnectListener = Arc<dyn Fn() + Send + Sync>;

/// Called when the transport closes.
pub type CloseListener = Arc<dyn Fn(&CloseEvent) + Send + Sync>;

/// Called for `err` envelopes no handler or reply claimed.
pub type ErrorListener = Arc<dyn Fn(&Failure) + Send + Sync>;

// ============================================================================
// Listeners
// ============================================================================

/// The four optional client-visible listeners.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    pub(crate) open: Option<OpenListener>,
    pub(crate) reconnect: Option<ReconnectListener>,
    pub(crate) close: Option<CloseListener>,
    pub(crate) error: Option<ErrorListener>,
}

// ============================================================================
// Panic Guard
// ============================================================================

/// Runs a user callback, containing any panic so it cannot take down the
/// transport task or timer that delivered the event.
pub(crate) fn guarded(what: &str, callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(callback = what, "Callback panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
