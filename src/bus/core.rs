//! Connection manager.
//!
//! [`EventBus`] is a cheap, cloneable handle to one bridge connection. All
//! state lives in a single `Inner` behind a mutex. Transport events and
//! timer firings lock it, apply the transition, and release it before any
//! user callback runs, so callbacks are free to call back into the bus.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, ReplyAddress};
use crate::protocol::{Envelope, Failure, Headers, Message, merge_headers};
use crate::timer::{Scheduler, TimerHandle, TokioScheduler};
use crate::transport::{
    CloseEvent, Connector, Transport, TransportSink, WebSocketConnector, websocket_endpoint,
};

use super::builder::EventBusBuilder;
use super::dispatch::{DispatchTable, Handler, Removal, ReplyHandler, reply_handler};
use super::keepalive::Keepalive;
use super::listeners::{Listeners, guarded};
use super::options::EventBusOptions;
use super::state::ConnectionState;

// ============================================================================
// Inner
// ============================================================================

/// State shared by every handle of one bus.
pub(crate) struct Inner {
    this: WeakEventBus,
    url: String,
    options: EventBusOptions,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,

    state: ConnectionState,
    connection_id: Option<ConnectionId>,
    transport: Option<Box<dyn Transport>>,
    table: DispatchTable,
    default_headers: Headers,
    keepalive: Keepalive,

    reconnect_enabled: bool,
    reconnect_attempts: u32,
    /// Armed reconnect timer. Still `Some` after it fires, until the
    /// resulting open, which is how an open is recognised as a reconnect.
    reconnect_timer: Option<TimerHandle>,

    listeners: Listeners,
}

impl Inner {
    /// Replaces the transport with a fresh one and resets both registries.
    fn setup_connection(&mut self) {
        let id = ConnectionId::next();
        self.connection_id = Some(id);
        self.state = ConnectionState::Connecting;

        // Subscriptions and pending replies belong to a socket
        self.table.clear();

        let sink = TransportSink::new(self.this.clone(), id);
        self.transport = Some(self.connector.open(&self.url, sink));

        debug!(%id, url = %self.url, "Connecting");
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        if self.connection_id == Some(id) {
            true
        } else {
            trace!(%id, current = ?self.connection_id, "Ignoring event from stale transport");
            false
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(Error::invalid_state(self.state))
        }
    }

    fn transmit(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.to_json()?;
        self.write(envelope.kind(), text)
    }

    fn write(&mut self, kind: &'static str, text: String) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        trace!(kind, len = text.len(), "Frame sent");
        transport.send(text);
        Ok(())
    }

    fn start_keepalive(&mut self) {
        let bus = self.this.clone();
        let started = self.keepalive.start(
            self.scheduler.as_ref(),
            Box::new(move || {
                if let Some(bus) = bus.upgrade() {
                    bus.handle_ping_timer();
                }
            }),
        );

        if started {
            self.send_ping();
        }
    }

    fn send_ping(&mut self) {
        if let Err(e) = self.transmit(&Envelope::Ping) {
            debug!(error = %e, "Ping not sent");
        }
    }

    fn enable_reconnect(&mut self, enable: bool) {
        self.reconnect_enabled = enable;
        if !enable && let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
            self.reconnect_attempts = 0;
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self
            .options
            .reconnect_delay(self.reconnect_attempts, &mut rand::thread_rng());

        let bus = self.this.clone();
        self.reconnect_timer = Some(self.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(bus) = bus.upgrade() {
                    bus.handle_reconnect_timer();
                }
            }),
        ));
        self.reconnect_attempts += 1;

        info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    fn send_envelope(
        &mut self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
        reply: Option<ReplyHandler>,
    ) -> Result<()> {
        if let Some(callback) = reply {
            return self.send_with_reply(address, body, headers, callback).map(|_| ());
        }

        self.ensure_open()?;
        let headers = merge_headers(&self.default_headers, headers);
        self.transmit(&Envelope::send(address, body, headers, None))
    }

    /// Registers the reply callback (before the frame goes out) and sends.
    ///
    /// The entry is dropped again if the frame cannot be written.
    fn send_with_reply(
        &mut self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
        callback: ReplyHandler,
    ) -> Result<ReplyAddress> {
        self.ensure_open()?;

        let headers = merge_headers(&self.default_headers, headers);
        let reply_address = ReplyAddress::generate();
        let text = Envelope::send(address, body, headers, Some(reply_address)).to_json()?;

        let key = reply_address.to_string();
        let timeout = self.options.reply_timeout.map(|after| {
            let bus = self.this.clone();
            let key = key.clone();
            self.scheduler.after(
                after,
                Box::new(move || {
                    if let Some(bus) = bus.upgrade() {
                        bus.handle_reply_timeout(&key);
                    }
                }),
            )
        });
        self.table.insert_reply(key.clone(), callback, timeout);

        if let Err(e) = self.write("send", text) {
            self.table.take_reply(&key);
            return Err(e);
        }
        Ok(reply_address)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.keepalive.stop();
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
        self.table.clear();
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Client for a Vert.x event bus bridge.
///
/// Construction starts connecting immediately. Register handlers from the
/// [`on_open`](Self::on_open) listener (and again from
/// [`on_reconnect`](Self::on_reconnect)): subscriptions do not survive a
/// reconnect.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::builder()
///     .url("http://localhost:8080/eventbus")
///     .options(EventBusOptions::new().with_reconnect(true))
///     .on_open(|| println!("connected"))
///     .build()?;
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

/// Non-owning handle held by transports and timers.
#[derive(Clone, Default)]
pub struct WeakEventBus {
    inner: Weak<Mutex<Inner>>,
}

impl WeakEventBus {
    /// Creates a handle that never upgrades.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upgrades to a strong handle if the bus is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

// ============================================================================
// EventBus - Constructors
// ============================================================================

impl EventBus {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Connects to `url` over WebSocket with default options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when called outside a tokio runtime
    /// - [`Error::Url`] / [`Error::Config`] for an unusable URL
    pub fn connect(url: impl Into<String>) -> Result<Self> {
        Self::connect_with_options(url, EventBusOptions::default())
    }

    /// Connects to `url` over WebSocket.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect), plus [`Error::Config`] for
    /// invalid options.
    pub fn connect_with_options(url: impl Into<String>, options: EventBusOptions) -> Result<Self> {
        let url = url.into();
        websocket_endpoint(&url)?;

        Self::builder()
            .url(url)
            .options(options)
            .connector(Arc::new(WebSocketConnector::new()?))
            .scheduler(Arc::new(TokioScheduler::new()?))
            .build()
    }

    /// Creates the bus and opens the first transport.
    pub(crate) fn start(
        url: String,
        options: EventBusOptions,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
        listeners: Listeners,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(Inner {
                this: WeakEventBus {
                    inner: weak.clone(),
                },
                url,
                default_headers: options.default_headers.clone(),
                keepalive: Keepalive::new(options.ping_interval),
                reconnect_enabled: options.reconnect_enabled,
                options,
                connector,
                scheduler,
                state: ConnectionState::Connecting,
                connection_id: None,
                transport: None,
                table: DispatchTable::default(),
                reconnect_attempts: 0,
                reconnect_timer: None,
                listeners,
            })
        });

        inner.lock().setup_connection();
        Self { inner }
    }

    /// Returns a non-owning handle.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// EventBus - Messaging
// ============================================================================

impl EventBus {
    /// Sends a point-to-point message.
    ///
    /// With `reply`, a fresh reply address is attached and `reply` runs at
    /// most once: on the first envelope to that address, or with a timeout
    /// failure when [`EventBusOptions::reply_timeout`] is set.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the bus is OPEN (nothing is sent)
    /// - [`Error::Json`] if the body cannot be serialized
    pub fn send(
        &self,
        address: &str,
        body: impl Into<Value>,
        headers: Option<Headers>,
        reply: Option<ReplyHandler>,
    ) -> Result<()> {
        self.inner
            .lock()
            .send_envelope(address, body.into(), headers, reply)
    }

    /// Publishes a message to every consumer of `address`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the bus is OPEN (nothing is sent)
    /// - [`Error::Json`] if the body cannot be serialized
    pub fn publish(
        &self,
        address: &str,
        body: impl Into<Value>,
        headers: Option<Headers>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;

        let headers = merge_headers(&inner.default_headers, headers);
        inner.transmit(&Envelope::publish(address, body.into(), headers))
    }

    /// Answers `message` on its reply address.
    ///
    /// # Errors
    ///
    /// - [`Error::NoReplyAddress`] if the sender did not expect a reply
    /// - everything [`send`](Self::send) returns
    pub fn reply(
        &self,
        message: &Message,
        body: impl Into<Value>,
        headers: Option<Headers>,
        reply: Option<ReplyHandler>,
    ) -> Result<()> {
        let address = message
            .reply_address
            .as_deref()
            .ok_or_else(|| Error::no_reply_address(&message.address))?;
        self.send(address, body, headers, reply)
    }

    /// Sends and waits for the reply without a time limit.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the bus is OPEN
    /// - [`Error::Failure`] if the server answered with `err`
    /// - [`Error::ConnectionClosed`] if the reply was discarded by a reconnect
    pub async fn request(
        &self,
        address: &str,
        body: impl Into<Value>,
        headers: Option<Headers>,
    ) -> Result<Message> {
        let (_, rx) = self.start_request(address, body.into(), headers)?;
        Self::finish_request(rx.await)
    }

    /// Sends and waits for the reply for at most `request_timeout`.
    ///
    /// On timeout the pending reply entry is removed.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request), plus [`Error::RequestTimeout`].
    pub async fn request_with_timeout(
        &self,
        address: &str,
        body: impl Into<Value>,
        headers: Option<Headers>,
        request_timeout: Duration,
    ) -> Result<Message> {
        let (reply_address, rx) = self.start_request(address, body.into(), headers)?;

        match timeout(request_timeout, rx).await {
            Ok(received) => Self::finish_request(received),
            Err(_) => {
                self.cancel_reply(&reply_address.to_string());
                Err(Error::request_timeout(
                    reply_address,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn start_request(
        &self,
        address: &str,
        body: Value,
        headers: Option<Headers>,
    ) -> Result<(ReplyAddress, oneshot::Receiver<StdResult<Message, Failure>>)> {
        let (tx, rx) = oneshot::channel();
        let callback = reply_handler(move |result| {
            let _ = tx.send(result);
        });

        let reply_address = self
            .inner
            .lock()
            .send_with_reply(address, body, headers, callback)?;

        Ok((reply_address, rx))
    }

    fn finish_request(
        received: StdResult<StdResult<Message, Failure>, oneshot::error::RecvError>,
    ) -> Result<Message> {
        match received {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(failure)) => Err(Error::Failure(failure)),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Drops a pending reply without invoking it.
    ///
    /// Returns `true` if an entry was removed.
    pub fn cancel_reply(&self, reply_address: &str) -> bool {
        let removed = self.inner.lock().table.take_reply(reply_address).is_some();
        if removed {
            debug!(reply_address, "Pending reply cancelled");
        }
        removed
    }
}

// ============================================================================
// EventBus - Handlers
// ============================================================================

impl EventBus {
    /// Registers a standing handler for `address`.
    ///
    /// The first handler for an address sends a `register` frame; later ones
    /// are local only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the bus is OPEN.
    pub fn register_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: Handler,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;

        if !inner.table.has_handlers(address) {
            let headers = merge_headers(&inner.default_headers, headers);
            inner.transmit(&Envelope::register(address, headers))?;
            debug!(address, "Address registered");
        }

        inner.table.add_handler(address, handler);
        Ok(())
    }

    /// Removes a handler previously passed to
    /// [`register_handler`](Self::register_handler).
    ///
    /// Removing the last handler for an address sends an `unregister` frame.
    /// Unknown handlers are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the bus is OPEN.
    pub fn unregister_handler(
        &self,
        address: &str,
        headers: Option<Headers>,
        handler: &Handler,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;

        if inner.table.remove_handler(address, handler) == Removal::LastRemoved {
            let headers = merge_headers(&inner.default_headers, headers);
            inner.transmit(&Envelope::unregister(address, headers))?;
            debug!(address, "Address unregistered");
        }

        Ok(())
    }
}

// ============================================================================
// EventBus - Lifecycle
// ============================================================================

impl EventBus {
    /// Closes the connection for good.
    ///
    /// Reconnection is disabled first, so the resulting close event ends in
    /// CLOSED without another attempt.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.state = ConnectionState::Closing;
        inner.enable_reconnect(false);

        match inner.transport.as_mut() {
            Some(transport) => transport.close(),
            // Between a close event and the reconnect timer
            None => inner.state = ConnectionState::Closed,
        }

        info!(url = %inner.url, "Close requested");
    }

    /// Turns automatic reconnection on or off.
    ///
    /// Turning it off cancels a pending reconnect and resets the attempt
    /// counter.
    pub fn enable_reconnect(&self, enable: bool) {
        self.inner.lock().enable_reconnect(enable);
    }

    /// Replaces the default headers.
    pub fn set_default_headers(&self, headers: Headers) {
        self.inner.lock().default_headers = headers;
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns the bridge URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.inner.lock().url.clone()
    }

    /// Returns the number of reconnects scheduled since the last open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    /// Returns the number of handlers registered for `address`.
    #[must_use]
    pub fn handler_count(&self, address: &str) -> usize {
        self.inner.lock().table.handler_count(address)
    }

    /// Returns the number of replies still awaited.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.inner.lock().table.pending_replies()
    }
}

// ============================================================================
// EventBus - Listeners
// ============================================================================

impl EventBus {
    /// Sets the listener run each time the bus reaches OPEN.
    pub fn on_open(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().listeners.open = Some(Arc::new(listener));
    }

    /// Sets the listener run after `on_open` when the open was a reconnect.
    pub fn on_reconnect(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().listeners.reconnect = Some(Arc::new(listener));
    }

    /// Sets the listener run when the transport closes.
    pub fn on_close(&self, listener: impl Fn(&CloseEvent) + Send + Sync + 'static) {
        self.inner.lock().listeners.close = Some(Arc::new(listener));
    }

    /// Sets the listener for `err` envelopes no handler or reply claimed.
    pub fn on_error(&self, listener: impl Fn(&Failure) + Send + Sync + 'static) {
        self.inner.lock().listeners.error = Some(Arc::new(listener));
    }
}

// ============================================================================
// EventBus - Transport & Timer Events
// ============================================================================

impl EventBus {
    pub(crate) fn handle_open(&self, id: ConnectionId) {
        let (open, reconnect) = {
            let mut inner = self.inner.lock();
            if !inner.is_current(id) {
                return;
            }

            // close() already ran; the close event will finish the job
            if inner.state == ConnectionState::Closing {
                debug!(%id, "Ignoring open after close was requested");
                return;
            }

            inner.start_keepalive();
            inner.state = ConnectionState::Open;

            let reconnected = inner.reconnect_timer.take().is_some();
            if reconnected {
                inner.reconnect_attempts = 0;
            }

            info!(%id, reconnected, "Event bus open");
            (
                inner.listeners.open.clone(),
                inner.listeners.reconnect.clone().filter(|_| reconnected),
            )
        };

        if let Some(listener) = open {
            guarded("open listener", || listener());
        }
        if let Some(listener) = reconnect {
            guarded("reconnect listener", || listener());
        }
    }

    pub(crate) fn handle_close(&self, id: ConnectionId, event: CloseEvent) {
        let listener = {
            let mut inner = self.inner.lock();
            if !inner.is_current(id) {
                return;
            }

            inner.state = ConnectionState::Closed;
            inner.keepalive.stop();
            inner.transport = None;

            info!(%id, %event, "Event bus closed");

            if inner.reconnect_enabled
                && inner.reconnect_attempts < inner.options.reconnect_attempts_max
            {
                inner.schedule_reconnect();
            } else if inner.reconnect_enabled {
                warn!(
                    attempts = inner.reconnect_attempts,
                    "Reconnect attempts exhausted"
                );
            }

            inner.listeners.close.clone()
        };

        if let Some(listener) = listener {
            guarded("close listener", || listener(&event));
        }
    }

    pub(crate) fn handle_message(&self, id: ConnectionId, text: &str) {
        let (delivery, on_error) = {
            let mut inner = self.inner.lock();
            if !inner.is_current(id) {
                return;
            }

            let envelope = match Envelope::from_json(text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, text = %text, "Failed to parse incoming message");
                    return;
                }
            };

            (inner.table.route(envelope), inner.listeners.error.clone())
        };

        delivery.deliver(on_error);
    }

    fn handle_ping_timer(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_open() {
            inner.send_ping();
        }
    }

    fn handle_reconnect_timer(&self) {
        let mut inner = self.inner.lock();
        if !inner.reconnect_enabled || inner.state != ConnectionState::Closed {
            debug!(state = %inner.state, "Reconnect timer no longer applies");
            return;
        }
        inner.setup_connection();
    }

    fn handle_reply_timeout(&self, reply_address: &str) {
        let callback = self.inner.lock().table.take_reply(reply_address);
        if let Some(callback) = callback {
            debug!(reply_address, "Reply timed out");
            guarded("reply", || callback(Err(Failure::timeout(reply_address))));
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus")
            .field("url", &inner.url)
            .field("state", &inner.state)
            .field("connection_id", &inner.connection_id)
            .field("pending_replies", &inner.table.pending_replies())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
