//! # Quantity Module
//!
//! Fixed-point stock quantities and unit conversion factors.
//!
//! ## Why Hundredths?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE DRIFT PROBLEM                                                      │
//! │                                                                         │
//! │  Selling 1 piece of a 12-piece carton in floating point:               │
//! │    8 - 1/12 = 7.916666666666667 cartons                                 │
//! │    ... repeated over thousands of ledger entries, the error creeps     │
//! │    into every balance snapshot.                                         │
//! │                                                                         │
//! │  OUR SOLUTION: Integer hundredths                                       │
//! │    800 - round(100 / 12) = 800 - 8 = 792  (7.92 cartons)               │
//! │    Every step rounds back to 2 decimals, so the stored value is        │
//! │    exactly what the next step reads.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rounding is half away from zero and always goes through `i128`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Scale shared by [`Quantity`], [`ConversionFactor`] and [`crate::Money`].
pub(crate) const SCALE: i128 = 100;

/// Divides and rounds half away from zero.
///
/// `den` must be non-zero; callers guard this.
pub(crate) fn round_div(num: i128, den: i128) -> i128 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den.abs() {
        if (num < 0) ^ (den < 0) {
            q - 1
        } else {
            q + 1
        }
    } else {
        q
    }
}

pub(crate) fn narrow(value: i128, what: &str) -> CoreResult<i64> {
    i64::try_from(value).map_err(|_| CoreError::Overflow(what.to_string()))
}

/// Parses a decimal string with at most two fractional digits into hundredths.
pub(crate) fn parse_hundredths(field: &str, raw: &str) -> Result<i64, ValidationError> {
    let raw = raw.trim();
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    if raw.is_empty() {
        return Err(ValidationError::required(field));
    }

    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("not a number"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a number"));
    }
    if frac.len() > 2 {
        return Err(invalid("at most 2 decimal places"));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("out of range"))?
    };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid("not a number"))? * 10,
        _ => frac.parse().map_err(|_| invalid("not a number"))?,
    };
    let value = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| invalid("out of range"))?;

    Ok(if negative { -value } else { value })
}

fn fmt_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
}

// =============================================================================
// Quantity
// =============================================================================

/// A stock quantity in hundredths of a unit.
///
/// Signed so that deltas and (when a branch allows it) negative stock
/// share the same type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Quantity(hundredths)
    }

    /// Whole units, e.g. `from_whole(12)` is 12.00.
    #[inline]
    pub const fn from_whole(units: i64) -> Self {
        Quantity(units * 100)
    }

    /// Parses a request-layer string such as `"12"` or `"0.5"`.
    ///
    /// ```rust
    /// use stockbook_core::Quantity;
    ///
    /// assert_eq!(Quantity::parse("quantity", "7.5").unwrap(), Quantity::from_hundredths(750));
    /// assert!(Quantity::parse("quantity", "1.005").is_err());
    /// ```
    pub fn parse(field: &str, raw: &str) -> Result<Self, ValidationError> {
        parse_hundredths(field, raw).map(Quantity)
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
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
        Quantity(self.0.abs())
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn floor_zero(self) -> Self {
        Quantity(self.0.max(0))
    }

    pub fn checked_add(self, other: Quantity) -> CoreResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Quantity)
            .ok_or_else(|| CoreError::Overflow("quantity".to_string()))
    }

    pub fn checked_sub(self, other: Quantity) -> CoreResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Quantity)
            .ok_or_else(|| CoreError::Overflow("quantity".to_string()))
    }

    /// `self × factor`, rounded to hundredths.
    ///
    /// ```rust
    /// use stockbook_core::{ConversionFactor, Quantity};
    ///
    /// let cartons = Quantity::from_whole(10);
    /// let per_carton = ConversionFactor::from_whole(12).unwrap();
    /// assert_eq!(cartons.scale_by(per_carton).unwrap(), Quantity::from_whole(120));
    /// ```
    pub fn scale_by(self, factor: ConversionFactor) -> CoreResult<Self> {
        let raw = round_div(self.0 as i128 * factor.hundredths() as i128, SCALE);
        narrow(raw, "quantity × conversion factor").map(Quantity)
    }

    /// `self ÷ factor`, rounded to hundredths.
    pub fn divide_by(self, factor: ConversionFactor) -> CoreResult<Self> {
        let raw = round_div(self.0 as i128 * SCALE, factor.hundredths() as i128);
        narrow(raw, "quantity ÷ conversion factor").map(Quantity)
    }
}

impl Neg for Quantity {
    type Output = Self;

    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

// =============================================================================
// Conversion Factor
// =============================================================================

/// Number of variant units per one base unit, in hundredths.
///
/// Always strictly positive. The "same as base" case that older data
/// encoded as a factor of `0` is modelled by
/// [`crate::variant::Conversion::BaseEquivalent`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(try_from = "i64", into = "i64")]
pub struct ConversionFactor(i64);

impl ConversionFactor {
    /// Creates a factor from hundredths; must be > 0.
    pub fn from_hundredths(hundredths: i64) -> Result<Self, ValidationError> {
        if hundredths <= 0 {
            return Err(ValidationError::positive("conversion factor"));
        }
        Ok(ConversionFactor(hundredths))
    }

    pub fn from_whole(units: i64) -> Result<Self, ValidationError> {
        Self::from_hundredths(units.saturating_mul(100))
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for ConversionFactor {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ConversionFactor::from_hundredths(value)
    }
}

impl From<ConversionFactor> for i64 {
    fn from(value: ConversionFactor) -> Self {
        value.0
    }
}

impl fmt::Display for ConversionFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_div_half_away_from_zero() {
        assert_eq!(round_div(5, 2), 3);
        assert_eq!(round_div(-5, 2), -3);
        assert_eq!(round_div(4, 3), 1);
        assert_eq!(round_div(-4, 3), -1);
        assert_eq!(round_div(50_000, 1_200), 42);
    }

    #[test]
    fn test_display() {
        assert_eq!(Quantity::from_whole(8).to_string(), "8.00");
        assert_eq!(Quantity::from_hundredths(792).to_string(), "7.92");
        assert_eq!(Quantity::from_hundredths(-50).to_string(), "-0.50");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Quantity::parse("q", "12").unwrap(), Quantity::from_whole(12));
        assert_eq!(Quantity::parse("q", "0.5").unwrap(), Quantity::from_hundredths(50));
        assert_eq!(Quantity::parse("q", ".25").unwrap(), Quantity::from_hundredths(25));
        assert_eq!(Quantity::parse("q", "-3.1").unwrap(), Quantity::from_hundredths(-310));
        assert!(Quantity::parse("q", "").is_err());
        assert!(Quantity::parse("q", "abc").is_err());
        assert!(Quantity::parse("q", "1.234").is_err());
        assert!(Quantity::parse("q", ".").is_err());
    }

    #[test]
    fn test_scale_and_divide() {
        let factor = ConversionFactor::from_whole(12).unwrap();
        assert_eq!(
            Quantity::from_whole(8).scale_by(factor).unwrap(),
            Quantity::from_whole(96)
        );
        // 1 piece of a 12-piece carton is 0.0833.. cartons, stored as 0.08
        assert_eq!(
            Quantity::from_whole(1).divide_by(factor).unwrap(),
            Quantity::from_hundredths(8)
        );
        assert_eq!(
            Quantity::from_whole(-5).divide_by(factor).unwrap(),
            Quantity::from_hundredths(-42)
        );
    }

    #[test]
    fn test_factor_must_be_positive() {
        assert!(ConversionFactor::from_hundredths(0).is_err());
        assert!(ConversionFactor::from_hundredths(-100).is_err());
        assert!(ConversionFactor::from_hundredths(50).is_ok());
    }

    #[test]
    fn test_factor_serde_rejects_zero() {
        let ok: ConversionFactor = serde_json::from_str("1200").unwrap();
        assert_eq!(ok.hundredths(), 1200);
        assert!(serde_json::from_str::<ConversionFactor>("0").is_err());
    }
}
