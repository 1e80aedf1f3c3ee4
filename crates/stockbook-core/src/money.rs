//! # Money Module
//!
//! Provides the `Money` type for prices, worth and ledger balances.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Account balances are running folds over hundreds of entries:          │
//! │    balance[i] = balance[i-1] + effect(entry[i])                        │
//! │  Any float error in one step is carried into every later balance.      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    All amounts are i64 cents, so replaying a ledger twice gives the    │
//! │    exact same balances both times.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::{Money, Quantity};
//!
//! let price = Money::from_cents(2_550);            // 25.50
//! let line = price.times(Quantity::from_hundredths(250)).unwrap(); // × 2.5
//! assert_eq!(line.cents(), 6_375);                 // 63.75
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::quantity::{narrow, parse_hundredths, round_div, Quantity, SCALE};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: customer balances go negative when debt grows
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **No currency**: the ledger is single-currency
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `from_major(500)` is 500.00.
    #[inline]
    pub const fn from_major(units: i64) -> Self {
        Money(units * 100)
    }

    /// Parses a request-layer amount such as `"199.99"`.
    pub fn parse(field: &str, raw: &str) -> Result<Self, ValidationError> {
        parse_hundredths(field, raw).map(Money)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Price × quantity, rounded to cents.
    ///
    /// ## User Workflow
    /// ```text
    /// sell_price 25.50 per CARTON, quantity 2.50
    ///      │
    ///      ▼
    /// times(2.50) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// 2550 × 250 / 100 = 6375 cents (63.75)
    /// ```
    pub fn times(self, quantity: Quantity) -> CoreResult<Money> {
        let raw = round_div(self.0 as i128 * quantity.hundredths() as i128, SCALE);
        narrow(raw, "price × quantity").map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
