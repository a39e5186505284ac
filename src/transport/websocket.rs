//! WebSocket connector and event loop.
//!
//! Each [`WebSocketConnector::open`] spawns one tokio task that:
//!
//! - Connects to the bridge's raw WebSocket endpoint
//! - Forwards inbound text frames to the [`TransportSink`]
//! - Drains the outbound queue filled by [`Transport::send`]
//! - Reports exactly one close event when the socket ends

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{CloseEvent, Connector, Transport, TransportSink};

// ============================================================================
// Constants
// ============================================================================

/// Path segment SockJS serves raw WebSocket connections on.
const WEBSOCKET_SEGMENT: &str = "websocket";

// ============================================================================
// Endpoint
// ============================================================================

/// Maps a bridge URL to its raw WebSocket endpoint.
///
/// `http`/`https` become `ws`/`wss` and `/websocket` is appended unless the
/// path already ends with it.
///
/// ```ignore
/// let url = websocket_endpoint("http://localhost:8888/eventbus")?;
/// assert_eq!(url.as_str(), "ws://localhost:8888/eventbus/websocket");
/// ```
///
/// # Errors
///
/// - [`Error::Url`] if `url` does not parse
/// - [`Error::Config`] for schemes other than http(s)/ws(s)
pub fn websocket_endpoint(url: &str) -> Result<Url> {
    let mut endpoint = Url::parse(url)?;

    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::config(format!(
                "Unsupported bridge URL scheme '{other}', expected http(s) or ws(s)"
            )));
        }
    };

    endpoint
        .set_scheme(scheme)
        .map_err(|()| Error::config(format!("Cannot use scheme '{scheme}' for {url}")))?;

    let path = endpoint.path().trim_end_matches('/').to_string();
    if !path.ends_with(&format!("/{WEBSOCKET_SEGMENT}")) {
        endpoint.set_path(&format!("{path}/{WEBSOCKET_SEGMENT}"));
    }

    Ok(endpoint)
}

// ============================================================================
// Outbound
// ============================================================================

/// Commands for the connection task.
enum Outbound {
    /// Write a text frame.
    Text(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Write half handed to the bus.
struct WebSocketTransport {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, text: String) {
        if self.tx.send(Outbound::Text(text)).is_err() {
            trace!("Dropping frame for finished connection");
        }
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// [`Connector`] for the Vert.x SockJS bridge over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    handle: Handle,
}

impl WebSocketConnector {
    /// Creates a connector on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime available: {e}")))?;
        Ok(Self { handle })
    }

    /// Creates a connector on an explicit runtime handle.
    #[inline]
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, sink: TransportSink) -> Box<dyn Transport> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handle.spawn(run_connection(url.to_string(), rx, sink));
        Box::new(WebSocketTransport { tx })
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Connects, then pumps frames until either side closes.
async fn run_connection(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    sink: TransportSink,
) {
    let id = sink.connection_id();

    let endpoint = match websocket_endpoint(&url) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(%id, error = %e, "Invalid bridge URL");
            sink.closed(CloseEvent::error(e.to_string()));
            return;
        }
    };

    let mut ws_stream = match connect_async(endpoint.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!(%id, %endpoint, error = %e, "WebSocket connect failed");
            sink.closed(CloseEvent::error(e.to_string()));
            return;
        }
    };

    if close_requested(&mut outbound) {
        debug!(%id, "Close requested while connecting");
        let _ = ws_stream.close(None).await;
        sink.closed(CloseEvent::clean(Some(1000), "closed by client"));
        return;
    }

    info!(%id, %endpoint, "WebSocket connection established");
    sink.opened();

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let close_event = loop {
        tokio::select! {
            // Incoming frames from the bridge
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(%id, len = text.len(), "Frame received");
                        sink.message(&text);
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(%id, "WebSocket closed by remote");
                        break match frame {
                            Some(frame) => CloseEvent::clean(
                                Some(u16::from(frame.code)),
                                frame.reason.as_str().to_string(),
                            ),
                            None => CloseEvent::clean(None, ""),
                        };
                    }

                    Some(Err(e)) => {
                        error!(%id, error = %e, "WebSocket error");
                        break CloseEvent::error(e.to_string());
                    }

                    None => {
                        debug!(%id, "WebSocket stream ended");
                        break CloseEvent::error("stream ended");
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Frames and commands from the bus
            command = outbound.recv() => {
                match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(%id, error = %e, "Failed to send frame");
                            break CloseEvent::error(e.to_string());
                        }
                    }

                    Some(Outbound::Close) => {
                        debug!(%id, "Close requested");
                        let _ = ws_write.close().await;
                        break CloseEvent::clean(Some(1000), "closed by client");
                    }

                    None => {
                        debug!(%id, "Transport dropped");
                        let _ = ws_write.close().await;
                        break CloseEvent::clean(Some(1000), "transport dropped");
                    }
                }
            }
        }
    };

    sink.closed(close_event);
    debug!(%id, "Connection task terminated");
}

/// Checks the queue for a close issued before the socket opened.
///
/// The bus sends no frames until it is open, so only a close (or a dropped
/// transport) can be waiting here.
fn close_requested(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> bool {
    loop {
        match outbound.try_recv() {
            Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => return true,
            Ok(Outbound::Text(text)) => {
                trace!(len = text.len(), "Dropping frame queued before open");
            }
            Err(TryRecvError::Empty) => return false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_requested_before_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!close_requested(&mut rx));

        tx.send(Outbound::Close).expect("receiver alive");
        assert!(close_requested(&mut rx));
    }

    #[test]
    fn test_dropped_transport_counts_as_close() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
        drop(tx);
        assert!(close_requested(&mut rx));
    }

    #[test]
    fn test_endpoint_from_sockjs_url() {
        let url = websocket_endpoint("http://localhost:8888/eventbus").expect("valid");
        assert_eq!(url.as_str(), "ws://localhost:8888/eventbus/websocket");
    }

    #[test]
    fn test_endpoint_https_becomes_wss() {
        let url = websocket_endpoint("https://bridge.example.com/eventbus/").expect("valid");
        assert_eq!(url.as_str(), "wss://bridge.example.com/eventbus/websocket");
    }

    #[test]
    fn test_endpoint_already_raw() {
        let url = websocket_endpoint("ws://127.0.0.1:7000/eventbus/websocket").expect("valid");
        assert_eq!(url.as_str(), "ws://127.0.0.1:7000/eventbus/websocket");
    }

    #[test]
    fn test_endpoint_rejects_other_schemes() {
        let err = websocket_endpoint("ftp://host/eventbus").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        let err = websocket_endpoint("not a url").unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(WebSocketConnector::new().is_err());
    }
}
