//! Core deterministic primitives.
//!
//! Fixed-point money and multipliers, the seeded PRNG and token hashing.
//! Nothing in here reads the clock or touches I/O.

pub mod fixed;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Amount, Multiplier, ParseDecimalError, AMOUNT_SCALE, MULTIPLIER_SCALE};
pub use rng::DeterministicRng;
pub use hash::{crash_hash, derive_round_seed};
