//! Deterministic 32.32 fixed-point scalar used for the tick accumulator and
//! sub-frame simulation deltas.
//!
//! Floating point arithmetic is not reproducible bit-for-bit across hosts
//! with different FPUs/codegen; every value that crosses the rollback
//! boundary (the tick accumulator, `OnSimulateTick` deltas, grace timers) is
//! represented as [`Fixed`] instead. Conversion to/from `f32` is provided
//! only at the edges (reading a wall-clock `Duration`, displaying a value)
//! and is explicitly lossy.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Number of fractional bits (the ".32" in "32.32").
const FRACTIONAL_BITS: u32 = 32;

/// A signed 64-bit fixed-point number with 32 integer bits and 32 fractional
/// bits.
///
/// Addition, subtraction, negation, and comparison are exact and associative
/// regardless of host float behavior. Multiplication by an integer scalar is
/// exact as long as the result does not overflow `i64`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Fixed(i64);

impl Fixed {
    /// The additive identity.
    pub const ZERO: Fixed = Fixed(0);

    /// Builds a `Fixed` directly from its raw 32.32 representation.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Fixed(raw)
    }

    /// Returns the raw 32.32 representation.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Builds a `Fixed` from a whole number of microseconds.
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        // micros * 2^32 / 1_000_000, kept as one 128-bit multiply to avoid
        // intermediate overflow for multi-second durations.
        let scaled = (micros as i128) << FRACTIONAL_BITS;
        Fixed((scaled / 1_000_000) as i64)
    }

    /// Builds a `Fixed` from a [`web_time::Duration`].
    #[must_use]
    pub fn from_duration(duration: web_time::Duration) -> Self {
        Fixed::from_micros(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }

    /// Lossy conversion from `f32` seconds, rounding to the nearest 32.32
    /// step. Forbidden inside the deterministic simulate/serialize/checksum
    /// path; intended only for reading external, non-deterministic input
    /// (wall-clock deltas, UI sliders).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f32_lossy(seconds: f32) -> Self {
        Fixed((f64::from(seconds) * (1u64 << FRACTIONAL_BITS) as f64).round() as i64)
    }

    /// Lossy conversion to `f32` seconds. Forbidden inside the deterministic
    /// path; intended only for display/telemetry.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32_lossy(self) -> f32 {
        (self.0 as f64 / (1u64 << FRACTIONAL_BITS) as f64) as f32
    }

    /// `true` if this value is non-negative.
    #[must_use]
    pub const fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    /// Saturating multiplication by a small non-negative integer scalar,
    /// used to express `n * frame_duration` without a lossy float round-trip.
    #[must_use]
    pub fn saturating_mul_u32(self, scalar: u32) -> Self {
        Fixed(self.0.saturating_mul(i64::from(scalar)))
    }
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        self.0 += rhs.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Fixed) {
        self.0 -= rhs.0;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl Mul<i64> for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: i64) -> Fixed {
        Fixed(self.0 * rhs)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.to_f32_lossy())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn micros_roundtrip_exact() {
        let a = Fixed::from_micros(16_667);
        let b = Fixed::from_micros(16_667);
        assert_eq!(a, b);
        assert_eq!(a + a, Fixed::from_micros(33_334));
    }

    #[test]
    fn addition_is_associative() {
        let a = Fixed::from_micros(1);
        let b = Fixed::from_micros(16_667);
        let c = Fixed::from_micros(999_999);
        assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn saturating_mul_matches_repeated_add() {
        let frame_duration = Fixed::from_micros(16_667);
        assert_eq!(frame_duration.saturating_mul_u32(2), frame_duration + frame_duration);
    }

    #[test]
    fn f32_conversion_is_lossy_but_close() {
        let fixed = Fixed::from_f32_lossy(0.016_667);
        let back = fixed.to_f32_lossy();
        assert!((back - 0.016_667).abs() < 0.000_01);
    }

    #[test]
    fn zero_is_additive_identity() {
        let v = Fixed::from_micros(12_345);
        assert_eq!(v + Fixed::ZERO, v);
        assert_eq!(v - v, Fixed::ZERO);
    }
}

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn proof_add_sub_roundtrip() {
        let a: i32 = kani::any();
        let b: i32 = kani::any();
        kani::assume(a.checked_add(b).is_some());
        let fa = Fixed::from_raw(i64::from(a));
        let fb = Fixed::from_raw(i64::from(b));
        kani::assert((fa + fb) - fb == fa, "fixed-point add/sub must round-trip exactly");
    }

    #[kani::proof]
    fn proof_ordering_matches_raw() {
        let a: i32 = kani::any();
        let b: i32 = kani::any();
        let fa = Fixed::from_raw(i64::from(a));
        let fb = Fixed::from_raw(i64::from(b));
        kani::assert((fa < fb) == (a < b), "Fixed ordering must match raw integer ordering");
    }
}
