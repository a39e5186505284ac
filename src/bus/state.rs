//! Connection lifecycle states.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of an [`EventBus`](crate::EventBus).
///
/// ```text
/// CONNECTING ──open──► OPEN ──close event──► CLOSED
///      ▲                 │                     │
///      └──── reconnect timer ◄─────────────────┘
///
/// any ──close()──► CLOSING ──close event──► CLOSED (permanent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport created, waiting for it to open.
    Connecting,
    /// Transport open; sends and registrations are accepted.
    Open,
    /// `close()` requested, waiting for the transport to close.
    Closing,
    /// Transport closed. A reconnect may be pending.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if the bus accepts outbound calls.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns the conventional upper-case name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_open_is_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Closing.is_open());
        assert!(!ConnectionState::Closed.is_open());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Closing.to_string(), "CLOSING");
    }
}
