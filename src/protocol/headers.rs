//! Envelope headers and the default-header merge policy.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer};

// ============================================================================
// Headers
// ============================================================================

/// String to string header map. Key order is irrelevant on the wire.
pub type Headers = FxHashMap<String, String>;

/// Merges bus-wide default headers into call-supplied headers.
///
/// Call-supplied values win per key. When the caller passes no headers at
/// all the result is empty; defaults only apply on top of an explicit map.
#[must_use]
pub fn merge_headers(defaults: &Headers, headers: Option<Headers>) -> Headers {
    let Some(mut headers) = headers else {
        return Headers::default();
    };

    for (name, value) in defaults {
        headers
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }

    headers
}

/// Reads a missing or `null` header map as empty.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Headers>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_no_call_headers_yields_empty() {
        let defaults = headers(&[("auth", "token")]);
        assert!(merge_headers(&defaults, None).is_empty());
    }

    #[test]
    fn test_call_headers_override_defaults() {
        let defaults = headers(&[("auth", "default"), ("lang", "en")]);
        let merged = merge_headers(&defaults, Some(headers(&[("auth", "mine")])));

        assert_eq!(merged.get("auth").map(String::as_str), Some("mine"));
        assert_eq!(merged.get("lang").map(String::as_str), Some("en"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_empty_call_headers_pick_up_defaults() {
        let defaults = headers(&[("lang", "en")]);
        let merged = merge_headers(&defaults, Some(Headers::default()));
        assert_eq!(merged, defaults);
    }

    #[test]
    fn test_no_defaults_passes_through() {
        let call = headers(&[("a", "1")]);
        assert_eq!(merge_headers(&Headers::default(), Some(call.clone())), call);
    }
}
