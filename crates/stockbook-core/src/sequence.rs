//! # Sequence Numbers
//!
//! Human-readable, per-branch document numbers such as `RCP-LHR-000042`.
//!
//! The generator is stateless: it derives the next value from the last one
//! issued. Reading the last value and storing the next one must happen in
//! the same transaction, which is the storage layer's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Default zero-padding width of the numeric suffix.
pub const DEFAULT_WIDTH: usize = 6;

/// Widest suffix that still fits a `u64` counter.
pub const MAX_WIDTH: usize = 18;

/// What a number identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Invoice,
    Receipt,
    Adjustment,
    Transfer,
    Payment,
}

impl SequenceKind {
    pub const ALL: [SequenceKind; 5] = [
        SequenceKind::Invoice,
        SequenceKind::Receipt,
        SequenceKind::Adjustment,
        SequenceKind::Transfer,
        SequenceKind::Payment,
    ];

    pub fn default_prefix(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "INV",
            SequenceKind::Receipt => "RCP",
            SequenceKind::Adjustment => "ADJ",
            SequenceKind::Transfer => "TRF",
            SequenceKind::Payment => "PAY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "invoice",
            SequenceKind::Receipt => "receipt",
            SequenceKind::Adjustment => "adjustment",
            SequenceKind::Transfer => "transfer",
            SequenceKind::Payment => "payment",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full prefix for a kind in a branch: `{KIND}-{BRANCH}-`.
pub fn branch_prefix(kind_prefix: &str, branch_code: &str) -> String {
    format!("{}-{}-", kind_prefix.trim().to_uppercase(), branch_code.trim().to_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGenerator {
    width: usize,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
        }
    }
}

impl SequenceGenerator {
    pub fn new(width: usize) -> Result<Self, ValidationError> {
        if !(1..=MAX_WIDTH).contains(&width) {
            return Err(ValidationError::InvalidFormat {
                field: "numbering width".to_string(),
                reason: format!("must be between 1 and {}", MAX_WIDTH),
            });
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Next number after `last` under `prefix`.
    ///
    /// ## Example
    /// ```rust
    /// use stockbook_core::sequence::SequenceGenerator;
    ///
    /// let gen = SequenceGenerator::default();
    /// assert_eq!(gen.next("INV-LHR-", None).unwrap(), "INV-LHR-000001");
    /// assert_eq!(gen.next("INV-LHR-", Some("INV-LHR-000041")).unwrap(), "INV-LHR-000042");
    /// assert!(gen.next("INV-LHR-", Some("RCP-LHR-000041")).is_err());
    /// ```
    ///
    /// The suffix grows past `width` rather than wrapping.
    pub fn next(&self, prefix: &str, last: Option<&str>) -> CoreResult<String> {
        let current = match last {
            None => 0,
            Some(last) => self.parse(prefix, last)?,
        };
        let next = current.checked_add(1).ok_or_else(|| CoreError::InvalidSequence {
            prefix: prefix.to_string(),
            last: last.unwrap_or_default().to_string(),
        })?;
        Ok(format!("{}{:0width$}", prefix, next, width = self.width))
    }

    fn parse(&self, prefix: &str, last: &str) -> CoreResult<u64> {
        let invalid = || CoreError::InvalidSequence {
            prefix: prefix.to_string(),
            last: last.to_string(),
        };

        let suffix = last.trim().strip_prefix(prefix).ok_or_else(invalid)?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        suffix.parse::<u64>().map_err(|_| invalid())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number() {
        let gen = SequenceGenerator::default();
        assert_eq!(gen.next("RCP-A-", None).unwrap(), "RCP-A-000001");
    }

    #[test]
    fn test_increments() {
        let gen = SequenceGenerator::new(4).unwrap();
        assert_eq!(gen.next("ADJ-A-", Some("ADJ-A-0009")).unwrap(), "ADJ-A-0010");
        assert_eq!(gen.next("ADJ-A-", Some("ADJ-A-9999")).unwrap(), "ADJ-A-10000");
    }

    #[test]
    fn test_rejects_foreign_or_broken_values() {
        let gen = SequenceGenerator::default();
        assert!(matches!(
            gen.next("INV-A-", Some("INV-B-000001")),
            Err(CoreError::InvalidSequence { .. })
        ));
        assert!(gen.next("INV-A-", Some("INV-A-")).is_err());
        assert!(gen.next("INV-A-", Some("INV-A-00x1")).is_err());
        assert!(gen.next("INV-A-", Some("INV-A-99999999999999999999999")).is_err());
    }

    #[test]
    fn test_branch_prefix() {
        assert_eq!(branch_prefix("trf", " lhr "), "TRF-LHR-");
        assert_eq!(SequenceKind::Payment.default_prefix(), "PAY");
    }

    #[test]
    fn test_width_bounds() {
        assert!(SequenceGenerator::new(0).is_err());
        assert!(SequenceGenerator::new(19).is_err());
        assert_eq!(SequenceGenerator::new(8).unwrap().width(), 8);
    }
}
