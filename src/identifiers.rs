//! Type-safe identifiers.
//!
//! | Type | Backing | Purpose |
//! |------|---------|---------|
//! | [`ReplyAddress`] | UUID v4 | One-shot reply correlation address |
//! | [`ConnectionId`] | `u64` | Generation of the underlying transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ReplyAddress
// ============================================================================

/// Freshly generated address a single reply is expected on.
///
/// Serialized in the canonical hyphenated form, e.g.
/// `"9b2f3c1e-8d4a-4f7e-a1b2-0c3d4e5f6a7b"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyAddress(Uuid);

impl ReplyAddress {
    /// Generates a new random (v4) reply address.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a reply address from its string form.
    ///
    /// Returns `None` if the string is not a UUID.
    #[inline]
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ReplyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport generation.
///
/// Every (re)connect gets a new id so that late events from a replaced
/// transport can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next process-unique connection id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_address_is_uuid_v4_shaped() {
        let address = ReplyAddress::generate().to_string();
        let parts: Vec<&str> = address.split('-').collect();

        assert_eq!(address.len(), 36);
        assert_eq!(
            parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(parts[2].starts_with('4'));
        assert!(matches!(parts[3].chars().next(), Some('8' | '9' | 'a' | 'b')));
    }

    #[test]
    fn test_reply_address_unique() {
        assert_ne!(ReplyAddress::generate(), ReplyAddress::generate());
    }

    #[test]
    fn test_reply_address_parse() {
        let address = ReplyAddress::generate();
        assert_eq!(ReplyAddress::parse(&address.to_string()), Some(address));
        assert_eq!(ReplyAddress::parse("chart.update"), None);
    }

    #[test]
    fn test_reply_address_serializes_as_string() {
        let address = ReplyAddress::generate();
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, format!("\"{address}\""));
    }

    #[test]
    fn test_connection_id_increments() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert!(first.to_string().starts_with("conn-"));
    }
}
