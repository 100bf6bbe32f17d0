//! # Money Module
//!
//! Provides the `Money` type for monetary values and `Rate` for percentages.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Basis Points                             │
//! │    Price 100.00  → 10000 cents                                          │
//! │    Discount 10%  → 1000 bps                                             │
//! │    10000 × 1000 / 10000 = 1000 cents off, exactly                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::{Money, Rate};
//!
//! let price = Money::from_cents(10000);            // 100.00
//! let discounted = price.apply_discount(Rate::from_bps(1000)).unwrap();
//! assert_eq!(discounted.cents(), 9000);            // 90.00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Basis points in 100%.
pub const BPS_PER_WHOLE: u32 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// `i64` so intermediate results such as a negative profit can be
/// represented; validation keeps stored prices and costs non-negative.
///
/// Arithmetic is checked only. Every operation that can leave the `i64`
/// range returns `None` and callers turn that into a validation error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(218, 50).cents(), 21850);
    /// ```
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

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns `rate` of this amount, rounded half away from zero, or `None`
    /// when the result does not fit.
    ///
    /// ```rust
    /// use stockroom_core::money::{Money, Rate};
    ///
    /// // 5% of 230.00 = 11.50
    /// let part = Money::from_cents(23000).percentage(Rate::from_bps(500)).unwrap();
    /// assert_eq!(part.cents(), 1150);
    /// ```
    pub fn percentage(&self, rate: Rate) -> Option<Money> {
        let scaled = i128::from(self.0.unsigned_abs()) * i128::from(rate.bps());
        let rounded = (scaled + i128::from(BPS_PER_WHOLE / 2)) / i128::from(BPS_PER_WHOLE);
        let signed = if self.0 < 0 { -rounded } else { rounded };
        i64::try_from(signed).ok().map(Money)
    }

    /// Subtracts a percentage discount and returns the remaining amount.
    #[inline]
    pub fn apply_discount(&self, rate: Rate) -> Option<Money> {
        self.checked_sub(self.percentage(rate)?)
    }

    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn checked_mul(self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds up a sequence, stopping at the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Caps this amount at `ceiling`.
    #[inline]
    pub fn min(self, ceiling: Money) -> Money {
        Money(self.0.min(ceiling.0))
    }
}

/// Shows money as `218.50`; the UI owns currency symbols and locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage in basis points (1 bp = 0.01%, 10000 bps = 100%).
///
/// Used for markup percentages, line discounts and order discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 100%.
    pub const WHOLE: Rate = Rate(BPS_PER_WHOLE);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage (for convenience).
    ///
    /// ```rust
    /// use stockroom_core::money::Rate;
    ///
    /// assert_eq!(Rate::from_percentage(12.5).bps(), 1250);
    /// ```
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
