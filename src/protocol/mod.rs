//! Event bus bridge wire protocol.
//!
//! The bridge speaks JSON text frames. Each frame is an [`Envelope`]
//! discriminated by its `type` field.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `send` | Client → Server | Point-to-point, optional `replyAddress` |
//! | `publish` | Client → Server | Fan-out to every consumer |
//! | `register` | Client → Server | Route an address to this client |
//! | `unregister` | Client → Server | Stop routing an address |
//! | `ping` | Client → Server | Keepalive |
//! | `rec` / `send` / `publish` | Server → Client | Delivery on an address |
//! | `err` | Server → Client | Failure for an address or the connection |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope, Message, Subscription and Failure types |
//! | `headers` | Header map and merge policy |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope message types.
pub mod envelope;

/// Header map and merge policy.
pub mod headers;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, Failure, Message, Subscription};
pub use headers::{Headers, merge_headers};
