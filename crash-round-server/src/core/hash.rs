//! Token Hashing
//!
//! Turns a freshly drawn round token into the integers the round needs:
//! - the 52-bit crash hash consumed by the value generator
//! - the 64-bit seed for the round's live-table RNG
//!
//! Both are SHA-256 with distinct domain separators, so the two values
//! derived from one token are independent.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type TokenDigest = [u8; 32];

/// Number of bits kept from the crash hash.
pub const CRASH_HASH_BITS: u32 = 52;

/// Domain separator for crash point derivation.
const CRASH_DOMAIN: &[u8] = b"CRASH_ROUND_POINT_V1";

/// Domain separator for live-table seed derivation.
const SEED_DOMAIN: &[u8] = b"CRASH_ROUND_SEED_V1";

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> TokenDigest {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// First 8 bytes of a digest as a little-endian u64.
#[inline]
fn leading_u64(digest: &TokenDigest) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Non-negative crash hash in `[0, 2^52)` for a round token.
pub fn crash_hash(token: &str) -> u64 {
    let digest = hash_with_domain(CRASH_DOMAIN, token.as_bytes());
    leading_u64(&digest) & ((1u64 << CRASH_HASH_BITS) - 1)
}

/// Derive the live-table RNG seed for a round token.
pub fn derive_round_seed(token: &str) -> u64 {
    let digest = hash_with_domain(SEED_DOMAIN, token.as_bytes());
    leading_u64(&digest)
}

/// Short hex fingerprint of a token, for logs.
///
/// Never log the raw token before the round ends: together with the public
/// derivation it would reveal the crash point.
pub fn token_fingerprint(token: &str) -> String {
    let digest = hash_with_domain(b"CRASH_ROUND_FINGERPRINT_V1", token.as_bytes());
    hex::encode(&digest[..4])
}
