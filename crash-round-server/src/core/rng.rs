//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, produces identical sequence on all platforms.
//!
//! The live table of each round is drawn from one of these, seeded from the
//! round token, so a round can be replayed exactly from its token.

use super::fixed::{Amount, Multiplier};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use crash_round::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_below(&mut self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        self.next_u64() % max
    }

    /// Generate a random integer in range [min, max).
    #[inline]
    pub fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + self.next_below(max - min)
    }

    /// Random amount in [min, max), to the cent.
    pub fn next_amount(&mut self, min: Amount, max: Amount) -> Amount {
        if min >= max {
            return min;
        }
        let span = (max.cents() - min.cents()) as u64;
        Amount::from_cents(min.cents() + self.next_below(span) as i64)
    }

    /// Random multiplier in [min, max), to the micro-unit.
    pub fn next_multiplier(&mut self, min: Multiplier, max: Multiplier) -> Multiplier {
        Multiplier::from_micros(self.next_range(min.micros(), max.micros()))
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        // Very unlikely to match
        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_range() {
        let mut rng = DeterministicRng::new(5678);

        for _ in 0..1000 {
            let val = rng.next_range(15, 35);
            assert!((15..35).contains(&val));
        }

        // Edge case: empty range
        assert_eq!(rng.next_range(5, 5), 5);
        assert_eq!(rng.next_below(0), 0);
    }

    #[test]
    fn test_next_amount_and_multiplier() {
        let mut rng = DeterministicRng::new(9999);
        let lo = Multiplier::from_hundredths(110);
        let hi = Multiplier::from_hundredths(610);

        for _ in 0..1000 {
            let a = rng.next_amount(Amount::from_units(10), Amount::from_units(210));
            assert!(a >= Amount::from_units(10) && a < Amount::from_units(210));

            let m = rng.next_multiplier(lo, hi);
            assert!(m >= lo && m < hi);
        }
    }
}
