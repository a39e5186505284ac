//! Event bus client.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EventBus`] | Connection manager and messaging API |
//! | [`EventBusBuilder`] | Fluent configuration |
//! | [`EventBusOptions`] | Keepalive, reconnect and reply settings |
//! | [`ConnectionState`] | `CONNECTING` / `OPEN` / `CLOSING` / `CLOSED` |
//!
//! # Lifecycle
//!
//! ```text
//!            open              close()
//! CONNECTING ─────► OPEN ───────────────► CLOSING
//!     ▲              │                       │
//!     │              │ transport closed      │ transport closed
//!     │              ▼                       ▼
//!     └──────────── CLOSED ◄─────────────────┘
//!   reconnect timer
//! ```
//!
//! Every open starts a fresh session: handlers and pending replies are
//! dropped, so re-register them from [`EventBus::on_open`].
//!
//! # Example
//!
//! ```no_run
//! use vertx_eventbus_bridge::{EventBus, EventBusOptions, handler};
//!
//! # async fn example() -> vertx_eventbus_bridge::Result<()> {
//! let bus = EventBus::connect_with_options(
//!     "http://localhost:8080/eventbus",
//!     EventBusOptions::new().with_reconnect(true),
//! )?;
//!
//! let weak = bus.downgrade();
//! bus.on_open(move || {
//!     let Some(bus) = weak.upgrade() else { return };
//!     let _ = bus.register_handler(
//!         "news.feed",
//!         None,
//!         handler(|result| println!("{result:?}")),
//!     );
//! });
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay computation.
pub mod backoff;

/// Builder pattern for bus configuration.
pub mod builder;

/// Connection manager.
pub mod core;

/// Handler and reply routing.
pub mod dispatch;

/// Keepalive ping driver.
mod keepalive;

/// Connection-level listeners.
pub mod listeners;

/// Event bus options.
pub mod options;

/// Connection state.
pub mod state;


// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::reconnect_delay;
pub use builder::EventBusBuilder;
pub use core::{EventBus, WeakEventBus};
pub use dispatch::{Handler, ReplyHandler, handler, reply_handler};
pub use listeners::{CloseListener, ErrorListener, OpenListener, ReconnectListener};
pub use options::EventBusOptions;
pub use state::ConnectionState;
