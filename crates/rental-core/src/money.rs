//! # Money Module
//!
//! Provides the `Money` type for daily rates, service rates and booking totals.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    3 days × 33.10 = 99.30000000000001  ❌ WRONG!                        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    3 × 3310 cents = 9930 cents, exactly                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rental_core::money::Money;
//!
//! let rate = Money::from_cents(4999); // 49.99 per day
//!
//! let four_days = rate * 4;                   // 199.96
//! let with_fee = four_days + Money::from_cents(1500); // 214.96
//! assert_eq!(with_fee.cents(), 21496);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money is Used
/// ```text
/// Vehicle.rate_per_day ──► RentalBooking.rate_per_day ──┐
///                                                        ├──► RentalBooking.amount
/// ServiceLine.rate × quantity ──► ServiceLine.total ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use rental_core::money::Money;
    ///
    /// let rate = Money::from_cents(5000);
    /// assert_eq!(rate.cents(), 5000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use rental_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(50, 0).cents(), 5000);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    ///
    /// For negative amounts only the major unit carries the sign.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
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

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity (days, service units).
    ///
    /// Saturates at the `i64` bounds instead of overflowing.
    ///
    /// ```rust
    /// use rental_core::money::Money;
    ///
    /// let seat = Money::from_cents(2000);
    /// assert_eq!(seat.multiply_quantity(2).cents(), 4000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display, e.g. `190.00`. Currency symbols are the caller's job.
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
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(49, 99).cents(), 4999);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(19000).to_string(), "190.00");
        assert_eq!(Money::from_cents(505).to_string(), "5.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let mut c = a;
        c += b;
        c -= Money::from_cents(100);
        assert_eq!(c.cents(), 1400);
    }

    #[test]
    fn test_multiply_saturates() {
        let rate = Money::from_cents(500);
        assert_eq!(rate.multiply_quantity(i64::MAX / 10).cents(), i64::MAX);
        assert_eq!(rate.multiply_quantity(-(i64::MAX / 10)).cents(), i64::MIN);
    }

    #[test]
    fn test_sum() {
        let lines = [Money::from_cents(4000), Money::from_cents(1500), Money::zero()];
        let total: Money = lines.iter().sum();
        assert_eq!(total.cents(), 5500);

        let empty: Vec<Money> = Vec::new();
        assert!(empty.into_iter().sum::<Money>().is_zero());
    }

    #[test]
    fn test_serde_is_transparent_cents() {
        let json = serde_json::to_string(&Money::from_cents(5000)).unwrap();
        assert_eq!(json, "5000");
        let back: Money = serde_json::from_str("2000").unwrap();
        assert_eq!(back, Money::from_cents(2000));
    }
}
