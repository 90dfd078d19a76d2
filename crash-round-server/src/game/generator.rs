//! Value Generator
//!
//! Produces the crash point of a round, once, when the round goes live.
//!
//! Two paths:
//! - **Override**: an operator-supplied value (>= 1.00x) waiting in the
//!   override slot is consumed and used verbatim.
//! - **Standard**: a fresh random token is hashed to `h ∈ [0, 2^52)`.
//!   `h mod 100 < 2` is an instant crash at 1.00x (house edge), otherwise
//!   `floor((M·E − h) / (E − h)) / 100` with `E = 2^52`, clamped to
//!   `[1.00x, crash_ceiling]`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::fixed::Multiplier;
use crate::core::hash::{crash_hash, CRASH_HASH_BITS};
use crate::core::rng::DeterministicRng;

/// `E` in the crash formula.
pub const HASH_SPACE: u128 = 1u128 << CRASH_HASH_BITS;

/// Configuration for crash point generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// `M` in the crash formula.
    pub max_multiplier: u64,
    /// Instant-crash probability in percent (`h mod 100 < this`).
    pub instant_crash_percent: u64,
    /// Upper bound for the formula path.
    pub crash_ceiling: Multiplier,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_multiplier: 10_000,
            instant_crash_percent: 2,
            crash_ceiling: Multiplier::from_hundredths(100_000_000), // 1,000,000.00x
        }
    }
}

/// Which path produced a crash point. Operator-facing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrashSource {
    /// Consumed from the override slot.
    Override,
    /// House-edge instant crash.
    InstantCrash,
    /// Continuous formula.
    Formula,
}

/// A freshly generated crash point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedCrash {
    /// The crash point (>= 1.00x).
    pub crash_point: Multiplier,
    /// Path that produced it.
    pub source: CrashSource,
}

/// Supplier of fresh round tokens.
pub trait EntropySource: Send {
    /// Draw a new, unpredictable token.
    fn draw_token(&mut self) -> String;
}

/// Production entropy: UUID v4 tokens from the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidEntropy;

impl EntropySource for UuidEntropy {
    fn draw_token(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Reproducible token stream for replays and tests.
#[derive(Debug, Clone)]
pub struct SeededEntropy {
    rng: DeterministicRng,
}

impl SeededEntropy {
    /// Create from a seed.
    pub fn new(seed: u64) -> Self {
        Self { rng: DeterministicRng::new(seed) }
    }
}

impl EntropySource for SeededEntropy {
    fn draw_token(&mut self) -> String {
        format!("{:016x}{:016x}", self.rng.next_u64(), self.rng.next_u64())
    }
}

/// The continuous formula, without the instant-crash rule.
///
/// `h >= E` makes the denominator non-positive; that clamps to 1.00x.
/// As `h → E` the quotient grows without bound; it is capped at
/// `config.crash_ceiling`.
pub fn formula_crash_point(h: u64, config: &GeneratorConfig) -> Multiplier {
    let h = h as u128;
    if h >= HASH_SPACE {
        return Multiplier::ONE;
    }

    let numerator = match (config.max_multiplier as u128)
        .checked_mul(HASH_SPACE)
        .and_then(|v| v.checked_sub(h))
    {
        Some(n) => n,
        None => return Multiplier::ONE,
    };
    let hundredths = numerator / (HASH_SPACE - h);

    let ceiling = config.crash_ceiling.hundredths() as u128;
    let clamped = hundredths.clamp(100, ceiling.max(100));
    Multiplier::from_hundredths(clamped as u64)
}

/// Standard path for a given hash: house edge first, then the formula.
pub fn standard_crash_point(h: u64, config: &GeneratorConfig) -> GeneratedCrash {
    if h % 100 < config.instant_crash_percent {
        return GeneratedCrash {
            crash_point: Multiplier::ONE,
            source: CrashSource::InstantCrash,
        };
    }
    GeneratedCrash {
        crash_point: formula_crash_point(h, config),
        source: CrashSource::Formula,
    }
}

/// Generate the crash point for a round.
///
/// The override slot is always emptied. An override below 1.00x is
/// discarded and the standard path runs instead.
pub fn generate_crash_point(
    token: &str,
    override_slot: &mut Option<Multiplier>,
    config: &GeneratorConfig,
) -> GeneratedCrash {
    if let Some(value) = override_slot.take() {
        if value.is_valid() {
            return GeneratedCrash {
                crash_point: value,
                source: CrashSource::Override,
            };
        }
    }
    standard_crash_point(crash_hash(token), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_override_used_verbatim_and_cleared() {
        let config = GeneratorConfig::default();
        let mut slot = Some(Multiplier::from_hundredths(500));

        let crash = generate_crash_point("any", &mut slot, &config);

        assert_eq!(crash.crash_point, Multiplier::from_hundredths(500));
        assert_eq!(crash.source, CrashSource::Override);
        assert!(slot.is_none());
    }

    #[test]
    fn test_invalid_override_discarded() {
        let config = GeneratorConfig::default();
        let mut slot = Some(Multiplier::from_hundredths(50));

        let crash = generate_crash_point("any", &mut slot, &config);

        assert_ne!(crash.source, CrashSource::Override);
        assert!(crash.crash_point.is_valid());
        assert!(slot.is_none());
    }

    #[test]
    fn test_instant_crash_rule() {
        let config = GeneratorConfig::default();
        assert_eq!(standard_crash_point(101, &config).source, CrashSource::InstantCrash);
        assert_eq!(standard_crash_point(101, &config).crash_point, Multiplier::ONE);
        assert_eq!(standard_crash_point(102, &config).source, CrashSource::Formula);
    }

    #[test]
    fn test_formula_at_zero_hash() {
        // (M·E) / E = M hundredths
        let config = GeneratorConfig::default();
        assert_eq!(formula_crash_point(0, &config), Multiplier::from_hundredths(10_000));

        let classic = GeneratorConfig { max_multiplier: 100, ..GeneratorConfig::default() };
        assert_eq!(formula_crash_point(0, &classic), Multiplier::ONE);
    }

    #[test]
    fn test_formula_edge_near_hash_space() {
        let config = GeneratorConfig::default();
        let near = (HASH_SPACE - 1) as u64;
        assert_eq!(formula_crash_point(near, &config), config.crash_ceiling);
        assert_eq!(formula_crash_point(HASH_SPACE as u64, &config), Multiplier::ONE);
        assert_eq!(formula_crash_point(u64::MAX, &config), Multiplier::ONE);
    }

    #[test]
    fn test_instant_crash_frequency() {
        let config = GeneratorConfig::default();
        let mut entropy = SeededEntropy::new(2024);
        let trials = 20_000;

        let instant = (0..trials)
            .filter(|_| {
                let token = entropy.draw_token();
                generate_crash_point(&token, &mut None, &config).crash_point == Multiplier::ONE
            })
            .count();

        // ~2%: 400 expected, allow generous slack
        assert!((300..=500).contains(&instant), "instant crashes: {}", instant);
    }

    #[test]
    fn test_generation_is_reproducible_from_token() {
        let config = GeneratorConfig::default();
        let a = generate_crash_point("fixed-token", &mut None, &config);
        let b = generate_crash_point("fixed-token", &mut None, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_uuid_entropy_draws_fresh_tokens() {
        let mut entropy = UuidEntropy;
        assert_ne!(entropy.draw_token(), entropy.draw_token());
    }

    proptest! {
        #[test]
        fn prop_crash_point_at_least_one(h in any::<u64>(), max in 0u64..20_000) {
            let config = GeneratorConfig { max_multiplier: max, ..GeneratorConfig::default() };
            let crash = standard_crash_point(h, &config);
            prop_assert!(crash.crash_point >= Multiplier::ONE);
            prop_assert!(crash.crash_point <= config.crash_ceiling);
        }

        #[test]
        fn prop_crash_point_whole_hundredths(token in "[a-z0-9]{8,32}") {
            let crash = generate_crash_point(&token, &mut None, &GeneratorConfig::default());
            prop_assert_eq!(crash.crash_point, crash.crash_point.floor_to_hundredths());
        }
    }
}
