//! Envelope message types.
//!
//! Every frame on the bridge is a JSON object discriminated by `type`.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "send",
//!   "address": "echo",
//!   "headers": { "trace": "1" },
//!   "body": "hi",
//!   "replyAddress": "9b2f3c1e-8d4a-4f7e-a1b2-0c3d4e5f6a7b"
//! }
//! ```
//!
//! | Type | Direction | Payload |
//! |------|-----------|---------|
//! | `send` | both | [`Message`] (point-to-point, may expect a reply) |
//! | `publish` | both | [`Message`] (fan-out) |
//! | `rec` | Server → Client | [`Message`] delivered to a registered address |
//! | `register` / `unregister` | Client → Server | [`Subscription`] |
//! | `ping` / `pong` | both | none |
//! | `err` | Server → Client | [`Failure`] |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::identifiers::ReplyAddress;

use super::Headers;
use super::headers::null_as_empty;

// ============================================================================
// Constants
// ============================================================================

/// Failure code used for locally generated reply timeouts.
pub const TIMEOUT_FAILURE_CODE: i64 = -1;

/// Failure type used for locally generated reply timeouts.
pub const TIMEOUT_FAILURE_TYPE: &str = "TIMEOUT";

// ============================================================================
// Envelope
// ============================================================================

/// A single frame exchanged with the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Point-to-point message.
    Send(Message),
    /// Broadcast message.
    Publish(Message),
    /// Message delivered by the server for a registered address.
    Rec(Message),
    /// Ask the server to route an address to this connection.
    Register(Subscription),
    /// Stop routing an address to this connection.
    Unregister(Subscription),
    /// Keepalive.
    Ping,
    /// Keepalive answer.
    Pong,
    /// Failure reported by the server.
    Err(Failure),
}

impl Envelope {
    /// Creates a `send` envelope.
    #[must_use]
    pub fn send(
        address: impl Into<String>,
        body: Value,
        headers: Headers,
        reply_address: Option<ReplyAddress>,
    ) -> Self {
        Self::Send(Message {
            address: address.into(),
            headers,
            body,
            reply_address: reply_address.map(|r| r.to_string()),
        })
    }

    /// Creates a `publish` envelope.
    #[must_use]
    pub fn publish(address: impl Into<String>, body: Value, headers: Headers) -> Self {
        Self::Publish(Message {
            address: address.into(),
            headers,
            body,
            reply_address: None,
        })
    }

    /// Creates a `register` envelope.
    #[must_use]
    pub fn register(address: impl Into<String>, headers: Headers) -> Self {
        Self::Register(Subscription {
            address: address.into(),
            headers,
        })
    }

    /// Creates an `unregister` envelope.
    #[must_use]
    pub fn unregister(address: impl Into<String>, headers: Headers) -> Self {
        Self::Unregister(Subscription {
            address: address.into(),
            headers,
        })
    }

    /// Returns the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::Publish(_) => "publish",
            Self::Rec(_) => "rec",
            Self::Register(_) => "register",
            Self::Unregister(_) => "unregister",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Err(_) => "err",
        }
    }

    /// Returns the target address, if the envelope type has one.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Send(m) | Self::Publish(m) | Self::Rec(m) => Some(&m.address),
            Self::Register(s) | Self::Unregister(s) => Some(&s.address),
            Self::Err(f) => f.address.as_deref(),
            Self::Ping | Self::Pong => None,
        }
    }

    /// Returns `true` for `err` envelopes.
    #[inline]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Serializes the envelope to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the body cannot be
    /// serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) for malformed frames or
    /// unknown `type` tags.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Message
// ============================================================================

/// Payload of `send`, `publish` and `rec` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Target address.
    pub address: String,

    /// Message headers. `null` on the wire reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: Headers,

    /// Opaque JSON body.
    #[serde(default)]
    pub body: Value,

    /// Address a reply should be sent to, if the sender expects one.
    #[serde(
        rename = "replyAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_address: Option<String>,
}

impl Message {
    /// Returns the body.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns a header value.
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns `true` if the sender expects a reply.
    #[inline]
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.reply_address.is_some()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Payload of `register` and `unregister` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Address being (un)registered.
    pub address: String,

    /// Headers forwarded to the bridge.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: Headers,
}

// ============================================================================
// Failure
// ============================================================================

/// Failure reported in an `err` envelope.
///
/// Handed to handlers and reply callbacks in place of a message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{failure_type} ({failure_code}): {message}")]
pub struct Failure {
    /// Address the failure relates to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Numeric failure code.
    #[serde(rename = "failureCode", default)]
    pub failure_code: i64,

    /// Failure category, e.g. `RECIPIENT_FAILURE`.
    #[serde(rename = "failureType", default)]
    pub failure_type: String,

    /// Human readable description.
    #[serde(default)]
    pub message: String,
}

impl Failure {
    /// Creates a failure.
    #[must_use]
    pub fn new(
        failure_code: i64,
        failure_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            address: None,
            failure_code,
            failure_type: failure_type.into(),
            message: message.into(),
        }
    }

    /// Creates the failure delivered when a reply did not arrive in time.
    #[must_use]
    pub fn timeout(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::new(
                TIMEOUT_FAILURE_CODE,
                TIMEOUT_FAILURE_TYPE,
                "Timed out waiting for a reply",
            )
        }
    }

    /// Returns `true` if this is a locally generated reply timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.failure_code == TIMEOUT_FAILURE_CODE && self.failure_type == TIMEOUT_FAILURE_TYPE
    }
}

// ============================================================================
// Tests
// ============================================================================
