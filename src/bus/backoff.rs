//! Reconnect backoff.
//!
//! Capped exponential backoff with optional two-sided jitter:
//!
//! ```text
//! base  = min × exponent^attempts
//! dev   = floor(r1 × factor × base)
//! delay = min(base ∓ dev, max)        sign picked by r2
//! ```
//!
//! Jitter spreads out clients that lost the same server at the same moment.

// ============================================================================
// Imports
// ============================================================================

use rand::Rng;

// ============================================================================
// Delay Calculation
// ============================================================================

/// Computes the delay in milliseconds before reconnect attempt `attempts`.
///
/// # Arguments
///
/// * `attempts` - Reconnects already scheduled since the last successful open
/// * `min_ms` / `max_ms` - Delay bounds; the result never exceeds `max_ms`
/// * `exponent` - Growth factor per attempt
/// * `randomization_factor` - Jitter in `[0, 1]`, `None` for none
/// * `rng` - Source of the two uniform draws used for jitter
#[must_use]
pub fn reconnect_delay<R: Rng + ?Sized>(
    attempts: u32,
    min_ms: u64,
    max_ms: u64,
    exponent: u32,
    randomization_factor: Option<f64>,
    rng: &mut R,
) -> u64 {
    let base = min_ms as f64 * f64::from(exponent).powf(f64::from(attempts));
    if !base.is_finite() {
        return max_ms;
    }

    let mut ms = base;
    if let Some(factor) = randomization_factor {
        let deviation = (rng.r#gen::<f64>() * factor * base).floor();
        let direction = (rng.r#gen::<f64>() * 10.0).floor() as u64;
        ms = if direction & 1 == 0 {
            ms - deviation
        } else {
            ms + deviation
        };
    }

    // Saturating float-to-int cast: negatives and NaN become 0
    (ms as u64).min(max_ms)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    fn no_jitter(attempts: u32, min: u64, max: u64, exponent: u32) -> u64 {
        reconnect_delay(attempts, min, max, exponent, None, &mut StepRng::new(0, 0))
    }

    #[test]
    fn test_capped_at_max() {
        assert_eq!(no_jitter(3, 1000, 5000, 2), 5000);
    }

    #[test]
    fn test_zero_factor_is_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempts in 0..6 {
            let expected = (1000u64 * 2u64.pow(attempts)).min(5000);
            assert_eq!(
                reconnect_delay(attempts, 1000, 5000, 2, Some(0.0), &mut rng),
                expected
            );
        }
    }

    #[test]
    fn test_exponential_growth() {
        assert_eq!(no_jitter(0, 1000, 60_000, 2), 1000);
        assert_eq!(no_jitter(1, 1000, 60_000, 2), 2000);
        assert_eq!(no_jitter(2, 1000, 60_000, 2), 4000);
        assert_eq!(no_jitter(4, 100, 60_000, 3), 8100);
    }

    #[test]
    fn test_huge_attempts_saturate() {
        assert_eq!(no_jitter(u32::MAX, 1000, 5000, 2), 5000);
        assert_eq!(
            reconnect_delay(5000, 1000, 5000, 2, Some(0.5), &mut StdRng::seed_from_u64(1)),
            5000
        );
    }

    #[test]
    fn test_even_decile_subtracts() {
        // StepRng(0, 0) draws 0.0 twice: zero deviation, even decile
        let mut rng = StepRng::new(0, 0);
        assert_eq!(reconnect_delay(1, 1000, 5000, 2, Some(0.5), &mut rng), 2000);
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let delay = reconnect_delay(1, 1000, 60_000, 2, Some(0.5), &mut rng);
            assert!((1000..=3000).contains(&delay), "delay {delay} out of band");
        }
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_max(
            attempts in 0u32..64,
            min in 0u64..10_000,
            extra in 0u64..100_000,
            exponent in 1u32..5,
            factor in proptest::option::of(0.0f64..=1.0),
            seed in any::<u64>(),
        ) {
            let max = min + extra;
            let mut rng = StdRng::seed_from_u64(seed);
            prop_assert!(reconnect_delay(attempts, min, max, exponent, factor, &mut rng) <= max);
        }

        #[test]
        fn prop_monotonic_without_jitter(
            attempts in 0u32..63,
            min in 0u64..10_000,
            max in 0u64..1_000_000,
            exponent in 1u32..5,
        ) {
            prop_assert!(
                no_jitter(attempts, min, max, exponent) <= no_jitter(attempts + 1, min, max, exponent)
            );
        }

        #[test]
        fn prop_zero_factor_matches_formula(
            attempts in 0u32..20,
            min in 0u64..10_000,
            max in 0u64..1_000_000,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let expected = min.saturating_mul(2u64.pow(attempts)).min(max);
            prop_assert_eq!(reconnect_delay(attempts, min, max, 2, Some(0.0), &mut rng), expected);
        }
    }
}
