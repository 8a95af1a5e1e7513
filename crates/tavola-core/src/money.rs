//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A bill of 199.00 split three ways:                                    │
//! │    19900 paise / 3 = 6633.33 → 6633 paise per share (66.33)            │
//! │    6633 × 3 = 19899 → 1 paisa of rounding slack, visible and exact     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tavola_core::money::Money;
//!
//! let price = Money::from_cents(10_000); // 100.00
//! let line = price.multiply_quantity(2);
//! assert_eq!(line.cents(), 20_000);
//! assert_eq!(line.to_string(), "200.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (paise, cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate sums may go negative (adjustments,
///   rounding remainders); persisted amounts are validated non-negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// MenuItem.price ──► cart line total ──► KOT line total
///                                            │
///                     adjustments ───────────┤
///                                            ▼
///                                     session total ──► Bill / Settlement
///                                            │
///                                            └──► split share (rounded)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-50).clamp_zero(), Money::zero());
    /// assert_eq!(Money::from_cents(50).clamp_zero().cents(), 50);
    /// ```
    #[inline]
    pub const fn clamp_zero(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `bps` basis points of this amount, rounded half-up at the
    /// minor unit.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let gross = Money::from_cents(10_005);
    /// // 10% of 100.05 = 10.005 → 10.01
    /// assert_eq!(gross.percentage_of(1_000).cents(), 1_001);
    /// ```
    pub fn percentage_of(&self, bps: i64) -> Money {
        // i128 keeps large bills from overflowing before the division
        let scaled = self.0 as i128 * bps as i128;
        Money::from_cents(div_round_half_up(scaled, 10_000) as i64)
    }

    /// Divides this amount into `parts` equal shares, rounding each share
    /// half-up at the minor unit. Returns `None` when `parts` is not positive.
    ///
    /// The shares are not reconciled against the original amount:
    /// `share * parts` may differ from `self` by up to `parts` minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tavola_core::money::Money;
    ///
    /// let total = Money::from_cents(19_900);
    /// assert_eq!(total.split_equal(3), Some(Money::from_cents(6_633)));
    /// assert_eq!(Money::from_cents(200).split_equal(3), Some(Money::from_cents(67)));
    /// assert_eq!(total.split_equal(0), None);
    /// ```
    pub fn split_equal(&self, parts: i64) -> Option<Money> {
        if parts <= 0 {
            return None;
        }
        Some(Money::from_cents(
            div_round_half_up(self.0 as i128, parts as i128) as i64,
        ))
    }
}

/// Integer division rounding half away from zero.
fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let doubled = numerator * 2;
    if doubled >= 0 {
        (doubled + denominator) / (2 * denominator)
    } else {
        (doubled - denominator) / (2 * denominator)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`1234.50`); currency symbols are a UI concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_split_equal_rounds_half_up() {
        // 199.00 / 3 = 66.333 → 66.33
        assert_eq!(Money::from_cents(19_900).split_equal(3).unwrap().cents(), 6_633);
        // 1.00 / 8 = 0.125 → 0.13 (half rounds up)
        assert_eq!(Money::from_cents(100).split_equal(8).unwrap().cents(), 13);
        // 2.00 / 3 = 0.666 → 0.67
        assert_eq!(Money::from_cents(200).split_equal(3).unwrap().cents(), 67);
        // exact division stays exact
        assert_eq!(Money::from_cents(30_000).split_equal(4).unwrap().cents(), 7_500);
    }

    #[test]
    fn test_split_equal_rejects_non_positive_parts() {
        assert!(Money::from_cents(100).split_equal(0).is_none());
        assert!(Money::from_cents(100).split_equal(-2).is_none());
    }

    #[test]
    fn test_split_slack_is_bounded() {
        for total in [1_i64, 99, 100, 19_900, 123_457, 1_000_001] {
            for parts in 2..=12 {
                let share = Money::from_cents(total).split_equal(parts).unwrap();
                let slack = (share.cents() * parts - total).abs();
                assert!(slack <= parts, "total={total} parts={parts} slack={slack}");
            }
        }
    }

    #[test]
    fn test_percentage_of() {
        assert_eq!(Money::from_cents(10_000).percentage_of(1_000).cents(), 1_000);
        assert_eq!(Money::from_cents(10_005).percentage_of(1_000).cents(), 1_001);
        assert_eq!(Money::from_cents(999).percentage_of(10_000).cents(), 999);
        assert_eq!(Money::from_cents(0).percentage_of(2_500).cents(), 0);
    }

    #[test]
    fn test_clamp_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::from_cents(-1).is_negative());
        assert_eq!(Money::from_cents(-300).clamp_zero(), Money::zero());
    }
}
