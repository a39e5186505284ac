//! Transport layer.
//!
//! The bus needs very little from the underlying duplex connection: a way to
//! open it, write text frames, close it, and be told when it opened, closed
//! or delivered a frame.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  EventBus       │                              │  Vert.x         │
//! │                 │      WebSocket (SockJS)      │  Bridge         │
//! │  Connector      │◄────────────────────────────►│                 │
//! │  → Transport    │   ws://host/eventbus/websocket                 │
//! │  ← TransportSink│                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connector::open` - Start connecting; returns the write half
//! 2. `TransportSink::opened` - Connection established
//! 3. `Transport::send` / `TransportSink::message` - Exchange frames
//! 4. `Transport::close` - Graceful shutdown requested
//! 5. `TransportSink::closed` - Connection gone (exactly once)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite connector and event loop |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::bus::WeakEventBus;
use crate::identifiers::ConnectionId;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connector and event loop.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{WebSocketConnector, websocket_endpoint};

// ============================================================================
// Transport
// ============================================================================

/// Write half of an open (or opening) connection.
pub trait Transport: Send {
    /// Queues a text frame. Fire-and-forget: failures surface only as a
    /// later close event.
    fn send(&mut self, text: String);

    /// Starts a graceful shutdown. A close event follows.
    fn close(&mut self);
}

// ============================================================================
// Connector
// ============================================================================

/// Creates transports.
///
/// `open` is called while the bus is locked. Implementations must deliver
/// events to the sink asynchronously, never from inside `open` itself.
pub trait Connector: Send + Sync {
    /// Starts connecting to `url`, reporting lifecycle events to `sink`.
    fn open(&self, url: &str, sink: TransportSink) -> Box<dyn Transport>;
}

// ============================================================================
// CloseEvent
// ============================================================================

/// Why a transport closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code sent by the peer, if any.
    pub code: Option<u16>,
    /// Close reason or local error description.
    pub reason: String,
    /// `true` if the close handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Close after a completed handshake.
    #[must_use]
    pub fn clean(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Close caused by a connection error.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "closed ({code}): {}", self.reason),
            None => write!(f, "closed: {}", self.reason),
        }
    }
}

// ============================================================================
// TransportSink
// ============================================================================

/// Event side of a transport, bound to one connection generation.
///
/// Events for a generation the bus has already replaced are ignored. Once
/// every [`EventBus`](crate::EventBus) handle is dropped the sink becomes
/// inert.
#[derive(Clone)]
pub struct TransportSink {
    bus: WeakEventBus,
    id: ConnectionId,
}

impl TransportSink {
    pub(crate) fn new(bus: WeakEventBus, id: ConnectionId) -> Self {
        Self { bus, id }
    }

    /// Returns the connection generation this sink reports for.
    #[inline]
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Reports that the connection is established.
    pub fn opened(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.handle_open(self.id);
        }
    }

    /// Reports that the connection is gone.
    pub fn closed(&self, event: CloseEvent) {
        if let Some(bus) = self.bus.upgrade() {
            bus.handle_close(self.id, event);
        }
    }

    /// Delivers one inbound text frame.
    pub fn message(&self, text: &str) {
        if let Some(bus) = self.bus.upgrade() {
            bus.handle_message(self.id, text);
        }
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
