//! Multiplier Function
//!
//! `m(t) = 1 + 0.06 · t^1.5`, `t` in seconds since the round went live.
//!
//! Evaluated in integer micro-units from elapsed milliseconds:
//!
//! ```text
//! u = elapsed µs
//! m = 1_000_000 + 6 · u · isqrt(u · 10^6) / 10^8
//! ```
//!
//! which agrees with the real-valued curve to within one micro-unit and is
//! strictly increasing in whole milliseconds.

use crate::core::fixed::{isqrt, Multiplier, MULTIPLIER_SCALE};

/// Live multiplier after `elapsed_ms` milliseconds of the Active phase.
pub fn multiplier_at(elapsed_ms: u64) -> Multiplier {
    let micros = elapsed_ms as u128 * 1_000;
    let growth = 6 * micros * isqrt(micros * 1_000_000) / 100_000_000;
    let total = (MULTIPLIER_SCALE as u128).saturating_add(growth);
    Multiplier::from_micros(total.min(u64::MAX as u128) as u64)
}

/// First whole millisecond at which the curve reaches `target`.
///
/// `multiplier_at(elapsed_for(x)) >= x` and, for `x > 1.00x`,
/// `multiplier_at(elapsed_for(x) - 1) < x`.
pub fn elapsed_for(target: Multiplier) -> u64 {
    if target <= Multiplier::ONE {
        return 0;
    }

    // Exponential probe for an upper bound, then bisect.
    let mut hi: u64 = 1;
    while multiplier_at(hi) < target {
        if hi > u64::MAX / 4 {
            return u64::MAX;
        }
        hi *= 2;
    }
    let mut lo = hi / 2;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if multiplier_at(mid) >= target {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_starts_at_one() {
        assert_eq!(multiplier_at(0), Multiplier::ONE);
    }

    #[test]
    fn test_known_points() {
        // 1s: 1 + 0.06 = 1.06
        assert_eq!(multiplier_at(1_000), Multiplier::from_hundredths(106));
        // 4s: 1 + 0.06 * 8 = 1.48
        assert_eq!(multiplier_at(4_000), Multiplier::from_hundredths(148));
        // 25s: 1 + 0.06 * 125 = 8.50
        assert_eq!(multiplier_at(25_000), Multiplier::from_hundredths(850));
    }

    #[test]
    fn test_matches_float_curve() {
        for ms in (0..120_000u64).step_by(337) {
            let t = ms as f64 / 1000.0;
            let expected = 1.0 + 0.06 * t.powf(1.5);
            let got = multiplier_at(ms).to_f64();
            assert!((expected - got).abs() < 2e-5, "t={} expected={} got={}", t, expected, got);
        }
    }

    #[test]
    fn test_elapsed_for_inverts() {
        for hundredths in [101u64, 150, 200, 327, 350, 1000, 10_000] {
            let target = Multiplier::from_hundredths(hundredths);
            let ms = elapsed_for(target);
            assert!(multiplier_at(ms) >= target);
            assert!(multiplier_at(ms - 1) < target);
        }
        assert_eq!(elapsed_for(Multiplier::ONE), 0);
    }

    proptest! {
        #[test]
        fn prop_never_below_one(ms in 0u64..10_000_000) {
            prop_assert!(multiplier_at(ms) >= Multiplier::ONE);
        }

        #[test]
        fn prop_strictly_increasing(a in 0u64..5_000_000, step in 1u64..10_000) {
            prop_assert!(multiplier_at(a) < multiplier_at(a + step));
        }
    }
}
