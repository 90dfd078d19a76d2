//! Decimal Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for multipliers and money.
//! All settlement logic uses integer arithmetic only - floats exist
//! solely for display and for sampling simulated participants.
//!
//! ## Formats
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Multiplier: u64, 6 fractional decimal digits               │
//! │      1.00x  = 1_000_000                                     │
//! │      2.37x  = 2_370_000                                     │
//! │                                                             │
//! │  Amount:     i64, 2 fractional decimal digits (cents)       │
//! │      100.00 = 10_000                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Crash points produced by the generator are whole hundredths. The live
//! multiplier keeps all six digits so the termination comparison is not
//! distorted by display rounding.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 1.00x in multiplier micro-units.
pub const MULTIPLIER_SCALE: u64 = 1_000_000;

/// 0.01x in multiplier micro-units.
pub const MULTIPLIER_HUNDREDTH: u64 = MULTIPLIER_SCALE / 100;

/// 1.00 in amount units (cents).
pub const AMOUNT_SCALE: i64 = 100;

/// Error parsing a decimal literal into a fixed-point value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDecimalError {
    /// Input was empty.
    #[error("empty decimal")]
    Empty,
    /// Input contained something other than digits, one dot and a sign.
    #[error("invalid decimal: {0}")]
    Invalid(String),
    /// More fractional digits than the format holds.
    #[error("too many fractional digits (max {0})")]
    TooPrecise(u32),
    /// Value does not fit the format.
    #[error("decimal out of range")]
    Overflow,
}

/// Parse `[-]digits[.digits]` into an integer scaled by `10^frac_digits`.
fn parse_scaled(input: &str, frac_digits: u32) -> Result<i128, ParseDecimalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ParseDecimalError::Empty);
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ParseDecimalError::Invalid(input.to_string()));
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(ParseDecimalError::Invalid(input.to_string()));
    }
    if frac_part.len() > frac_digits as usize {
        return Err(ParseDecimalError::TooPrecise(frac_digits));
    }

    let mut value: i128 = 0;
    for b in int_part.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i128))
            .ok_or(ParseDecimalError::Overflow)?;
    }
    let mut frac: i128 = 0;
    for b in frac_part.bytes() {
        frac = frac * 10 + (b - b'0') as i128;
    }
    for _ in frac_part.len()..frac_digits as usize {
        frac *= 10;
    }

    let scaled = value
        .checked_mul(10i128.pow(frac_digits))
        .and_then(|v| v.checked_add(frac))
        .ok_or(ParseDecimalError::Overflow)?;

    Ok(if negative { -scaled } else { scaled })
}

/// Integer square root (floor) using Newton-Raphson iteration.
///
/// Exact for every input; never panics.
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = n / 2 + (n & 1);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

// =============================================================================
// MULTIPLIER
// =============================================================================

/// Payout multiplier in micro-units (1.00x = 1_000_000).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the floor for every crash point and threshold.
    pub const ONE: Self = Self(MULTIPLIER_SCALE);

    /// Create from raw micro-units.
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create from hundredths (`237` = 2.37x).
    #[inline]
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths.saturating_mul(MULTIPLIER_HUNDREDTH))
    }

    /// Raw micro-units.
    #[inline]
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Value in hundredths, floored.
    #[inline]
    pub const fn hundredths(self) -> u64 {
        self.0 / MULTIPLIER_HUNDREDTH
    }

    /// Drop precision below 0.01x.
    #[inline]
    pub const fn floor_to_hundredths(self) -> Self {
        Self::from_hundredths(self.hundredths())
    }

    /// Whether this is a legal crash point or threshold (>= 1.00x).
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= MULTIPLIER_SCALE
    }

    /// Clamp to at least 1.00x.
    #[inline]
    pub fn at_least_one(self) -> Self {
        self.max(Self::ONE)
    }

    /// Convert to float for display/rendering.
    ///
    /// Only use for visual output. Never feed the result back into settlement.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / MULTIPLIER_SCALE as f64
    }

    /// Convert a float to a multiplier, truncating below one micro-unit.
    ///
    /// Negative and non-finite inputs map to zero.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self(0);
        }
        Self((value * MULTIPLIER_SCALE as f64) as u64)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Debug for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiplier({}.{:06})",
            self.0 / MULTIPLIER_SCALE,
            self.0 % MULTIPLIER_SCALE
        )
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.hundredths();
        write!(f, "{}.{:02}x", h / 100, h % 100)
    }
}

impl FromStr for Multiplier {
    type Err = ParseDecimalError;

    /// Accepts `2`, `2.5`, `2.50` and an optional trailing `x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_suffix('x')
            .or_else(|| trimmed.strip_suffix('X'))
            .unwrap_or(trimmed);
        let scaled = parse_scaled(body, 6)?;
        if scaled < 0 {
            return Err(ParseDecimalError::Invalid(s.to_string()));
        }
        u64::try_from(scaled)
            .map(Self)
            .map_err(|_| ParseDecimalError::Overflow)
    }
}

// =============================================================================
// AMOUNT
// =============================================================================

/// Money amount in cents. Signed so that invalid stakes are representable
/// and can be rejected by validation rather than by the type system.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(AMOUNT_SCALE))
    }

    /// Raw cents.
    #[inline]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Strictly greater than zero.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Strictly less than zero.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `self × multiplier`, floored to the cent.
    ///
    /// Uses i128 intermediate to prevent overflow; saturates at the i64 range.
    pub fn times(self, multiplier: Multiplier) -> Self {
        let wide = (self.0 as i128) * (multiplier.micros() as i128) / MULTIPLIER_SCALE as i128;
        Self(wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Convert to float for display.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / AMOUNT_SCALE as f64
    }

    /// Convert a float to cents, truncating toward zero.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Self::ZERO;
        }
        Self((value * AMOUNT_SCALE as f64) as i64)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / AMOUNT_SCALE as u64, abs % AMOUNT_SCALE as u64)
    }
}

impl FromStr for Amount {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scaled = parse_scaled(s, 2)?;
        i64::try_from(scaled)
            .map(Self)
            .map_err(|_| ParseDecimalError::Overflow)
    }
}

impl Add for Amount {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Amount {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Amount {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

// =============================================================================
// TESTS
// =============================================================================
