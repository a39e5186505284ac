//! Event bus options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use vertx_eventbus_bridge::EventBusOptions;
//!
//! let options = EventBusOptions::new()
//!     .with_reconnect(true)
//!     .with_ping_interval(Duration::from_secs(10))
//!     .with_reconnect_delay(Duration::from_millis(500), Duration::from_secs(30))
//!     .with_randomization_factor(None);
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};
use crate::protocol::Headers;

use super::backoff::reconnect_delay;

// ============================================================================
// Defaults
// ============================================================================

/// Default keepalive ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(5000);

/// Default lower reconnect delay bound.
pub const DEFAULT_RECONNECT_DELAY_MIN: Duration = Duration::from_millis(1000);

/// Default upper reconnect delay bound.
pub const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_millis(5000);

/// Default backoff growth factor.
pub const DEFAULT_RECONNECT_EXPONENT: u32 = 2;

/// Default jitter factor.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

// ============================================================================
// EventBusOptions
// ============================================================================

/// Connection, keepalive and reconnect configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBusOptions {
    /// Keepalive ping interval. Zero disables pings.
    pub ping_interval: Duration,

    /// Reconnect automatically after the transport closes.
    pub reconnect_enabled: bool,

    /// Maximum consecutive reconnect attempts. `u32::MAX` is unbounded.
    pub reconnect_attempts_max: u32,

    /// Delay before the first reconnect attempt.
    pub reconnect_delay_min: Duration,

    /// Upper bound for any reconnect delay.
    pub reconnect_delay_max: Duration,

    /// Backoff growth factor per attempt.
    pub reconnect_exponent: u32,

    /// Jitter factor in `[0, 1]`; `None` disables jitter.
    pub randomization_factor: Option<f64>,

    /// Abandon pending replies after this long. `None` waits forever.
    pub reply_timeout: Option<Duration>,

    /// Headers merged into calls that pass their own headers.
    pub default_headers: Headers,
}

impl Default for EventBusOptions {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_enabled: false,
            reconnect_attempts_max: u32::MAX,
            reconnect_delay_min: DEFAULT_RECONNECT_DELAY_MIN,
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY_MAX,
            reconnect_exponent: DEFAULT_RECONNECT_EXPONENT,
            randomization_factor: Some(DEFAULT_RANDOMIZATION_FACTOR),
            reply_timeout: None,
            default_headers: Headers::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl EventBusOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the keepalive ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Disables keepalive pings.
    #[inline]
    #[must_use]
    pub fn without_ping(mut self) -> Self {
        self.ping_interval = Duration::ZERO;
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect_enabled = enabled;
        self
    }

    /// Sets the maximum number of consecutive reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnect_attempts_max(mut self, attempts: u32) -> Self {
        self.reconnect_attempts_max = attempts;
        self
    }

    /// Sets the reconnect delay bounds.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_delay_min = min;
        self.reconnect_delay_max = max;
        self
    }

    /// Sets the backoff growth factor.
    #[inline]
    #[must_use]
    pub fn with_reconnect_exponent(mut self, exponent: u32) -> Self {
        self.reconnect_exponent = exponent;
        self
    }

    /// Sets the jitter factor.
    #[inline]
    #[must_use]
    pub fn with_randomization_factor(mut self, factor: Option<f64>) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Sets a timeout for pending replies.
    #[inline]
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Adds a default header.
    #[inline]
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// Validation & Derived Values
// ============================================================================

impl EventBusOptions {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the delay bounds are inverted, the
    /// exponent is zero, the jitter factor is outside `[0, 1]`, or the reply
    /// timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_delay_min > self.reconnect_delay_max {
            return Err(Error::config(format!(
                "reconnect_delay_min ({:?}) exceeds reconnect_delay_max ({:?})",
                self.reconnect_delay_min, self.reconnect_delay_max
            )));
        }

        if self.reconnect_exponent == 0 {
            return Err(Error::config("reconnect_exponent must be at least 1"));
        }

        if let Some(factor) = self.randomization_factor
            && !(0.0..=1.0).contains(&factor)
        {
            return Err(Error::config(format!(
                "randomization_factor must be within [0, 1], got {factor}"
            )));
        }

        if self.reply_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("reply_timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Returns `true` if keepalive pings are enabled.
    #[inline]
    #[must_use]
    pub fn ping_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }

    /// Computes the delay before reconnect attempt `attempts`.
    #[must_use]
    pub fn reconnect_delay<R: Rng + ?Sized>(&self, attempts: u32, rng: &mut R) -> Duration {
        Duration::from_millis(reconnect_delay(
            attempts,
            saturating_millis(self.reconnect_delay_min),
            saturating_millis(self.reconnect_delay_max),
            self.reconnect_exponent,
            self.randomization_factor,
            rng,
        ))
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::mock::StepRng;

    #[test]
    fn test_defaults() {
        let options = EventBusOptions::new();
        assert_eq!(options.ping_interval, Duration::from_millis(5000));
        assert_eq!(options.reconnect_attempts_max, u32::MAX);
        assert_eq!(options.reconnect_delay_min, Duration::from_millis(1000));
        assert_eq!(options.reconnect_delay_max, Duration::from_millis(5000));
        assert_eq!(options.reconnect_exponent, 2);
        assert_eq!(options.randomization_factor, Some(0.5));
        assert!(!options.reconnect_enabled);
        assert!(options.reply_timeout.is_none());
        assert!(options.default_headers.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = EventBusOptions::new()
            .with_reconnect(true)
            .with_reconnect_attempts_max(3)
            .with_reconnect_delay(Duration::from_millis(10), Duration::from_millis(80))
            .with_reconnect_exponent(3)
            .with_randomization_factor(None)
            .with_reply_timeout(Duration::from_secs(2))
            .with_default_header("auth", "t")
            .without_ping();

        assert!(options.reconnect_enabled);
        assert_eq!(options.reconnect_attempts_max, 3);
        assert_eq!(options.reconnect_exponent, 3);
        assert_eq!(options.reply_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.default_headers.get("auth").map(String::as_str), Some("t"));
        assert!(!options.ping_enabled());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_inverted_bounds() {
        let options = EventBusOptions::new()
            .with_reconnect_delay(Duration::from_secs(10), Duration::from_secs(1));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_zero_exponent() {
        let options = EventBusOptions::new().with_reconnect_exponent(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_factor_range() {
        assert!(EventBusOptions::new().with_randomization_factor(Some(1.5)).validate().is_err());
        assert!(EventBusOptions::new().with_randomization_factor(Some(f64::NAN)).validate().is_err());
        assert!(EventBusOptions::new().with_randomization_factor(Some(1.0)).validate().is_ok());
    }

    #[test]
    fn test_validate_zero_reply_timeout() {
        let options = EventBusOptions::new().with_reply_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_reconnect_delay_uses_bounds() {
        let options = EventBusOptions::new().with_randomization_factor(None);
        let mut rng = StepRng::new(0, 0);
        assert_eq!(options.reconnect_delay(0, &mut rng), Duration::from_millis(1000));
        assert_eq!(options.reconnect_delay(3, &mut rng), Duration::from_millis(5000));
    }
}
