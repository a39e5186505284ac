//! Builder pattern for bus configuration.
//!
//! Provides a fluent API for configuring and starting an [`EventBus`].
//!
//! # Example
//!
//! ```no_run
//! use vertx_eventbus_bridge::{EventBus, EventBusOptions};
//!
//! # async fn example() -> vertx_eventbus_bridge::Result<()> {
//! let bus = EventBus::builder()
//!     .url("http://localhost:8080/eventbus")
//!     .options(EventBusOptions::new().with_reconnect(true))
//!     .on_open(|| tracing::info!("bridge up"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::Failure;
use crate::timer::{Scheduler, TokioScheduler};
use crate::transport::{CloseEvent, Connector, WebSocketConnector, websocket_endpoint};

use super::core::EventBus;
use super::listeners::Listeners;
use super::options::EventBusOptions;

// ============================================================================
// EventBusBuilder
// ============================================================================

/// Builder for configuring an [`EventBus`].
///
/// Use [`EventBus::builder()`] to create a new builder. Without an explicit
/// connector and scheduler, the WebSocket/tokio stack is used and `build`
/// must run inside a tokio runtime.
#[derive(Default, Clone)]
pub struct EventBusBuilder {
    /// Bridge URL.
    url: Option<String>,
    /// Connection options.
    options: EventBusOptions,
    /// Transport factory.
    connector: Option<Arc<dyn Connector>>,
    /// Timer facility.
    scheduler: Option<Arc<dyn Scheduler>>,
    /// Listeners installed before the first transport event can arrive.
    listeners: Listeners,
}

// ============================================================================
// EventBusBuilder Implementation
// ============================================================================

impl EventBusBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bridge URL, e.g. `http://localhost:8080/eventbus`.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the connection options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: EventBusOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets a custom transport factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets a custom timer facility.
    #[inline]
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the open listener.
    #[inline]
    #[must_use]
    pub fn on_open(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.listeners.open = Some(Arc::new(listener));
        self
    }

    /// Sets the reconnect listener.
    #[inline]
    #[must_use]
    pub fn on_reconnect(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.listeners.reconnect = Some(Arc::new(listener));
        self
    }

    /// Sets the close listener.
    #[inline]
    #[must_use]
    pub fn on_close(mut self, listener: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.listeners.close = Some(Arc::new(listener));
        self
    }

    /// Sets the connection-level error listener.
    #[inline]
    #[must_use]
    pub fn on_error(mut self, listener: impl Fn(&Failure) + Send + Sync + 'static) -> Self {
        self.listeners.error = Some(Arc::new(listener));
        self
    }

    /// Validates the configuration and starts connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or the options are invalid
    /// - [`Error::Url`] / [`Error::Config`] if the default WebSocket
    ///   connector cannot use the URL
    /// - [`Error::Config`] if a default component needs a tokio runtime and
    ///   none is running
    pub fn build(self) -> Result<EventBus> {
        let url = self.validate_url()?;
        self.options.validate()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => {
                websocket_endpoint(&url)?;
                Arc::new(WebSocketConnector::new()?)
            }
        };

        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::new()?),
        };

        Ok(EventBus::start(
            url,
            self.options,
            connector,
            scheduler,
            self.listeners,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl EventBusBuilder {
    /// Validates the URL configuration.
    fn validate_url(&self) -> Result<String> {
        let url = self.url.clone().ok_or_else(|| {
            Error::config(
                "Bridge URL is required. Use .url() to set it.\n\
                 Example: EventBus::builder().url(\"http://localhost:8080/eventbus\")",
            )
        })?;

        if url.trim().is_empty() {
            return Err(Error::config("Bridge URL must not be empty"));
        }

        Ok(url)
    }
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .field("custom_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
