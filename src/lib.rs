//! Vert.x event bus bridge client.
//!
//! This library talks to a Vert.x event bus exposed through the SockJS
//! bridge, over a single long-lived WebSocket.
//!
//! # Architecture
//!
//! The client follows a handle/inner model:
//!
//! - **EventBus**: Cloneable handle; all state sits behind one mutex
//! - **Transport**: Duplex text connection, created by a [`Connector`]
//! - **Scheduler**: Timer facility for keepalive, backoff and reply timeouts
//!
//! Key design principles:
//!
//! - Every (re)connect is a new session: handlers and pending replies reset
//! - Events from a replaced transport are ignored
//! - Callbacks never run with the bus locked, so they may call back in
//! - Transport and timers are injectable for deterministic tests
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use vertx_eventbus_bridge::{EventBus, EventBusOptions, Result, reply_handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bus = EventBus::connect_with_options(
//!         "http://localhost:8080/eventbus",
//!         EventBusOptions::new().with_reconnect(true),
//!     )?;
//!
//!     let weak = bus.downgrade();
//!     bus.on_open(move || {
//!         let Some(bus) = weak.upgrade() else { return };
//!         let _ = bus.send(
//!             "greeter",
//!             json!({"name": "bridge"}),
//!             None,
//!             Some(reply_handler(|reply| println!("{reply:?}"))),
//!         );
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     bus.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bus`] | [`EventBus`], builder, options and routing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Reply addresses and connection generations |
//! | [`protocol`] | Bridge envelope types |
//! | [`timer`] | Scheduler abstraction, tokio and manual clocks |
//! | [`transport`] | Transport abstraction and WebSocket connector |

// ============================================================================
// Modules
// ============================================================================

/// Event bus client.
///
/// Use [`EventBus::builder()`] or [`EventBus::connect`] to start a client.
pub mod bus;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers for reply addresses and transport generations.
pub mod identifiers;

/// Bridge wire format.
///
/// JSON envelopes exchanged with the bridge.
pub mod protocol;

/// Timer scheduling.
///
/// Abstracts delayed and periodic callbacks.
pub mod timer;

/// Transport layer.
///
/// Duplex connection abstraction and the WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bus types
pub use bus::{
    CloseListener, ConnectionState, ErrorListener, EventBus, EventBusBuilder, EventBusOptions,
    Handler, OpenListener, ReconnectListener, ReplyHandler, WeakEventBus, handler, reply_handler,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, ReplyAddress};

// Protocol types
pub use protocol::{Envelope, Failure, Headers, Message};

// Timer types
pub use timer::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};

// Transport types
pub use transport::{CloseEvent, Connector, Transport, TransportSink, WebSocketConnector};
