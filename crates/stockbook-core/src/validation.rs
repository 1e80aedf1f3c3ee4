//! # Validation Module
//!
//! Input validation for typed requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (out of scope)                                  │
//! │  └── Form parsing into typed request structs                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine requests (Rust)                                       │
//! │  └── THIS MODULE: names, unit codes, references, amounts               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (product name per branch, ref_no per account)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::validation::{normalize_unit_code, validate_ref_no};
//!
//! assert_eq!(normalize_unit_code(" carton ").unwrap(), "CARTON");
//! assert!(validate_ref_no("").is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted unit code.
pub const MAX_UNIT_CODE_LEN: usize = 20;

/// Longest accepted reference number.
pub const MAX_REF_NO_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

fn required_trimmed<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value)
}

/// Normalizes a unit code: trimmed and upper-cased.
///
/// Lookups and storage both go through this so `"carton"`, `"Carton "` and
/// `"CARTON"` name the same variant.
pub fn normalize_unit_code(unit_code: &str) -> ValidationResult<String> {
    let code = required_trimmed("unit_code", unit_code, MAX_UNIT_CODE_LEN)?;

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ' ')
    {
        return Err(ValidationError::InvalidFormat {
            field: "unit_code".to_string(),
            reason: "must contain only letters, numbers, spaces, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(code.to_uppercase())
}

/// Validates a product name and returns it trimmed.
///
/// ## Example
/// ```rust
/// use stockbook_core::validation::validate_product_name;
///
/// assert_eq!(validate_product_name("  Basmati Rice ").unwrap(), "Basmati Rice");
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    required_trimmed("product", name, 200).map(str::to_string)
}

/// Product names are unique per branch regardless of case and spacing.
pub fn product_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Validates an external reference (invoice, receipt or payment number).
pub fn validate_ref_no(ref_no: &str) -> ValidationResult<String> {
    required_trimmed("ref_no", ref_no, MAX_REF_NO_LEN).map(str::to_string)
}

/// Branch codes feed sequence prefixes, so they are short and upper-case.
pub fn validate_branch_code(code: &str) -> ValidationResult<String> {
    let code = required_trimmed("branch code", code, 10)?;

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "branch code".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(code.to_uppercase())
}

/// Optional free text such as an adjustment note.
pub fn validate_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    match note.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if text.chars().count() > 500 => Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: 500,
        }),
        Some(text) => Ok(Some(text.to_string())),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Movement quantities are always strictly positive; direction is explicit.
pub fn validate_movement_quantity(quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::positive("quantity"));
    }
    Ok(())
}

pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::positive(field));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
