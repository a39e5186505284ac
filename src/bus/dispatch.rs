//! Dispatch table.
//!
//! Two lookup tables keyed by address:
//!
//! - **Handlers**: standing subscriptions, invoked for every delivery in
//!   registration order until unregistered
//! - **Replies**: one-shot callbacks keyed by a generated reply address,
//!   removed before they are invoked
//!
//! Routing precedence for an inbound envelope:
//!
//! 1. Handlers registered for its address
//! 2. A pending reply for its address
//! 3. Connection-level error listener (`err` only)
//! 4. Orphan, logged and dropped

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::protocol::{Envelope, Failure, Message};
use crate::timer::TimerHandle;

use super::listeners::{ErrorListener, guarded};

// ============================================================================
// Handler Types
// ============================================================================

/// Standing handler: `Ok` for messages, `Err` for `err` envelopes.
///
/// Handlers are compared by `Arc` identity on unregister, so keep a clone
/// of the `Arc` you registered.
pub type Handler = Arc<dyn Fn(StdResult<&Message, &Failure>) + Send + Sync>;

/// One-shot reply callback.
pub type ReplyHandler = Box<dyn FnOnce(StdResult<Message, Failure>) + Send>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(callback: F) -> Handler
where
    F: Fn(StdResult<&Message, &Failure>) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Wraps a closure as a [`ReplyHandler`].
pub fn reply_handler<F>(callback: F) -> ReplyHandler
where
    F: FnOnce(StdResult<Message, Failure>) + Send + 'static,
{
    Box::new(callback)
}

// ============================================================================
// Table
// ============================================================================

/// A reply callback waiting for its envelope.
struct PendingReply {
    callback: ReplyHandler,
    timeout: Option<TimerHandle>,
}

/// Result of removing a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// Handler was not registered for the address.
    NotFound,
    /// Handler removed; others remain.
    Removed,
    /// Handler removed and the address has no handlers left.
    LastRemoved,
}

/// Handler and reply registries.
#[derive(Default)]
pub(crate) struct DispatchTable {
    handlers: FxHashMap<String, Vec<Handler>>,
    replies: FxHashMap<String, PendingReply>,
}

impl DispatchTable {
    pub(crate) fn handler_count(&self, address: &str) -> usize {
        self.handlers.get(address).map_or(0, Vec::len)
    }

    pub(crate) fn has_handlers(&self, address: &str) -> bool {
        self.handler_count(address) > 0
    }

    /// Appends a handler. Returns `true` if it is the first for `address`.
    pub(crate) fn add_handler(&mut self, address: &str, handler: Handler) -> bool {
        let handlers = self.handlers.entry(address.to_string()).or_default();
        handlers.push(handler);
        handlers.len() == 1
    }

    /// Removes one registration of `handler`, dropping the entry once empty.
    pub(crate) fn remove_handler(&mut self, address: &str, handler: &Handler) -> Removal {
        let Some(handlers) = self.handlers.get_mut(address) else {
            return Removal::NotFound;
        };
        let Some(index) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return Removal::NotFound;
        };

        handlers.remove(index);
        if handlers.is_empty() {
            self.handlers.remove(address);
            Removal::LastRemoved
        } else {
            Removal::Removed
        }
    }

    pub(crate) fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub(crate) fn insert_reply(
        &mut self,
        address: String,
        callback: ReplyHandler,
        timeout: Option<TimerHandle>,
    ) {
        self.replies
            .insert(address, PendingReply { callback, timeout });
    }

    /// Removes a pending reply, cancelling its timeout.
    pub(crate) fn take_reply(&mut self, address: &str) -> Option<ReplyHandler> {
        let pending = self.replies.remove(address)?;
        if let Some(timeout) = pending.timeout {
            timeout.cancel();
        }
        Some(pending.callback)
    }

    /// Drops every handler and pending reply.
    pub(crate) fn clear(&mut self) {
        let handlers = self.handlers.len();
        let replies = self.replies.len();

        self.handlers.clear();
        for (_, pending) in self.replies.drain() {
            if let Some(timeout) = pending.timeout {
                timeout.cancel();
            }
        }

        if handlers > 0 || replies > 0 {
            debug!(handlers, replies, "Dispatch table cleared");
        }
    }

    /// Decides who receives `envelope`.
    ///
    /// A matching reply entry is removed here, before anything is invoked,
    /// so it can fire at most once even if delivery re-enters the bus.
    pub(crate) fn route(&mut self, envelope: Envelope) -> Delivery {
        let payload = match envelope {
            Envelope::Send(m) | Envelope::Publish(m) | Envelope::Rec(m) => Payload::Message(m),
            Envelope::Err(f) => Payload::Failure(f),
            other => return Delivery::Ignored(other.kind()),
        };

        if let Some(address) = payload.address() {
            if let Some(handlers) = self.handlers.get(address).filter(|h| !h.is_empty()) {
                return Delivery::Handlers {
                    handlers: handlers.clone(),
                    payload,
                };
            }

            if let Some(callback) = self.take_reply(address) {
                return Delivery::Reply { callback, payload };
            }
        }

        match payload {
            Payload::Failure(failure) => Delivery::ConnectionError(failure),
            Payload::Message(message) => Delivery::Orphan(message),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Routed inbound content.
pub(crate) enum Payload {
    Message(Message),
    Failure(Failure),
}

impl Payload {
    fn address(&self) -> Option<&str> {
        match self {
            Self::Message(m) => Some(&m.address),
            Self::Failure(f) => f.address.as_deref(),
        }
    }

    fn into_result(self) -> StdResult<Message, Failure> {
        match self {
            Self::Message(m) => Ok(m),
            Self::Failure(f) => Err(f),
        }
    }
}

/// Routing decision, executed after the bus lock is released.
pub(crate) enum Delivery {
    Handlers {
        handlers: Vec<Handler>,
        payload: Payload,
    },
    Reply {
        callback: ReplyHandler,
        payload: Payload,
    },
    ConnectionError(Failure),
    Orphan(Message),
    Ignored(&'static str),
}

impl Delivery {
    /// Invokes the chosen recipients.
    pub(crate) fn deliver(self, on_error: Option<ErrorListener>) {
        match self {
            Self::Handlers { handlers, payload } => {
                for handler in handlers {
                    match &payload {
                        Payload::Message(message) => guarded("handler", || handler(Ok(message))),
                        Payload::Failure(failure) => guarded("handler", || handler(Err(failure))),
                    }
                }
            }

            Self::Reply { callback, payload } => {
                guarded("reply", || callback(payload.into_result()));
            }

            Self::ConnectionError(failure) => match on_error {
                Some(listener) => guarded("error listener", || listener(&failure)),
                None => warn!(%failure, "Unhandled bridge error"),
            },

            Self::Orphan(message) => {
                warn!(address = %message.address, "No handler found for message");
            }

            Self::Ignored("pong") => trace!("Pong received"),

            Self::Ignored(kind) => debug!(kind, "Ignoring unexpected envelope from server"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::protocol::Headers;

    fn recording(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        handler(move |result| {
            let entry = match result {
                Ok(message) => format!("{tag}:{}", message.body),
                Err(failure) => format!("{tag}:err:{}", failure.failure_code),
            };
            log.lock().push(entry);
        })
    }

    fn rec(address: &str, body: serde_json::Value) -> Envelope {
        Envelope::Rec(Message {
            address: address.to_string(),
            headers: Headers::default(),
            body,
            reply_address: None,
        })
    }

    #[test]
    fn test_first_handler_flag() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();

        assert!(table.add_handler("a", recording(&log, "1")));
        assert!(!table.add_handler("a", recording(&log, "2")));
        assert!(table.add_handler("b", recording(&log, "3")));
        assert_eq!(table.handler_count("a"), 2);
    }

    #[test]
    fn test_handlers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        table.add_handler("a", recording(&log, "first"));
        table.add_handler("a", recording(&log, "second"));

        table.route(rec("a", json!(1))).deliver(None);

        assert_eq!(*log.lock(), vec!["first:1", "second:1"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        let first = recording(&log, "first");
        let second = recording(&log, "second");
        table.add_handler("a", Arc::clone(&first));
        table.add_handler("a", Arc::clone(&second));

        let stranger = recording(&log, "stranger");
        assert_eq!(table.remove_handler("a", &stranger), Removal::NotFound);
        assert_eq!(table.remove_handler("missing", &first), Removal::NotFound);

        assert_eq!(table.remove_handler("a", &first), Removal::Removed);
        assert_eq!(table.remove_handler("a", &second), Removal::LastRemoved);
        assert!(!table.has_handlers("a"));
        assert_eq!(table.remove_handler("a", &second), Removal::NotFound);
    }

    #[test]
    fn test_reply_taken_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        let sink = Arc::clone(&log);
        table.insert_reply(
            "r-1".into(),
            reply_handler(move |result| {
                sink.lock().push(format!("{:?}", result.map(|m| m.body)));
            }),
            None,
        );

        table.route(rec("r-1", json!("hi"))).deliver(None);
        assert_eq!(table.pending_replies(), 0);
        assert_eq!(*log.lock(), vec![r#"Ok(String("hi"))"#]);

        assert!(matches!(table.route(rec("r-1", json!("again"))), Delivery::Orphan(_)));
    }

    #[test]
    fn test_handlers_take_precedence_over_reply() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        table.add_handler("x", recording(&log, "h"));
        table.insert_reply("x".into(), reply_handler(|_| {}), None);

        assert!(matches!(table.route(rec("x", json!(0))), Delivery::Handlers { .. }));
        assert_eq!(table.pending_replies(), 1);
    }

    #[test]
    fn test_err_to_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        table.add_handler("chart.update", recording(&log, "h"));

        let mut failure = Failure::new(1, "X", "bad");
        failure.address = Some("chart.update".into());
        table.route(Envelope::Err(failure)).deliver(None);

        assert_eq!(*log.lock(), vec!["h:err:1"]);
    }

    #[test]
    fn test_unmatched_err_goes_to_error_listener() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let listener: ErrorListener = Arc::new(move |failure: &Failure| {
            *sink.lock() = Some(failure.clone());
        });

        let mut table = DispatchTable::default();
        table
            .route(Envelope::Err(Failure::new(7, "ACCESS_DENIED", "nope")))
            .deliver(Some(listener));

        assert_eq!(seen.lock().as_ref().map(|f| f.failure_code), Some(7));
    }

    #[test]
    fn test_pong_ignored() {
        let mut table = DispatchTable::default();
        assert!(matches!(table.route(Envelope::Pong), Delivery::Ignored("pong")));
    }

    #[test]
    fn test_clear_cancels_reply_timeouts() {
        let cancelled = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&cancelled);
        let mut table = DispatchTable::default();
        table.add_handler("a", handler(|_| {}));
        table.insert_reply(
            "r".into(),
            reply_handler(|_| {}),
            Some(TimerHandle::new(move || *flag.lock() = true)),
        );

        table.clear();

        assert!(!table.has_handlers("a"));
        assert_eq!(table.pending_replies(), 0);
        assert!(*cancelled.lock());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = DispatchTable::default();
        table.add_handler("a", handler(|_| panic!("bad handler")));
        table.add_handler("a", recording(&log, "ok"));

        table.route(rec("a", json!(2))).deliver(None);
        assert_eq!(*log.lock(), vec!["ok:2"]);
    }
}
