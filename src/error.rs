//! Error types for the event bus bridge client.
//!
//! This module defines the crate-level [`enum@Error`] returned by fallible
//! client calls. Failures reported *by the server* (envelopes of type `err`)
//! are not crate errors; they travel to handlers as
//! [`Failure`](crate::protocol::Failure) values.
//!
//! # Usage
//!
//! ```ignore
//! use vertx_eventbus_bridge::{EventBus, Result};
//!
//! fn announce(bus: &EventBus) -> Result<()> {
//!     bus.publish("news.feed", serde_json::json!({"headline": "hi"}), None)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | State | [`Error::InvalidState`], [`Error::NoReplyAddress`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | Remote | [`Error::Failure`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::bus::ConnectionState;
use crate::identifiers::ReplyAddress;
use crate::protocol::Failure;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bus options or the builder are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Operation attempted while the connection is not open.
    ///
    /// Returned synchronously by `send`, `publish`, `register_handler` and
    /// `unregister_handler`. Never retried.
    #[error("INVALID_STATE_ERR: connection is {state}")]
    InvalidState {
        /// State the bus was in when the call was made.
        state: ConnectionState,
    },

    /// Reply requested for a message that carries no reply address.
    #[error("Message on '{address}' has no reply address")]
    NoReplyAddress {
        /// Address the message was delivered on.
        address: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Server answered a request with an `err` envelope.
    #[error("Remote failure: {0}")]
    Failure(Failure),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Request/reply timeout.
    #[error("Request {reply_address} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Correlation address of the abandoned reply.
        reply_address: ReplyAddress,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid bridge URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(state: ConnectionState) -> Self {
        Self::InvalidState { state }
    }

    /// Creates a missing reply address error.
    #[inline]
    pub fn no_reply_address(address: impl Into<String>) -> Self {
        Self::NoReplyAddress {
            address: address.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(reply_address: ReplyAddress, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            reply_address,
            timeout_ms,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is the invalid state signal.
    #[inline]
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::RequestTimeout { .. } => true,
            Self::Failure(failure) => failure.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the bus is open again.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::RequestTimeout { .. } | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::config("url is required");
        assert_eq!(err.to_string(), "Configuration error: url is required");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state(ConnectionState::Connecting);
        assert_eq!(
            err.to_string(),
            "INVALID_STATE_ERR: connection is CONNECTING"
        );
        assert!(err.is_invalid_state());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::invalid_state(ConnectionState::Closed).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_timeout() {
        let err = Error::request_timeout(ReplyAddress::generate(), 500);
        assert!(err.is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());

        let failure: Error = Failure::timeout("a.b").into();
        assert!(failure.is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
