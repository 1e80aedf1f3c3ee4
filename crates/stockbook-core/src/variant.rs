//! # Variant Module
//!
//! A product's sellable units and the proportional recalculation that keeps
//! them consistent with the base unit.
//!
//! ## Conversion Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product "Biscuits"                                                     │
//! │                                                                         │
//! │  index 0 (base)   CARTON   qty 10.00                                    │
//! │  index 1          PACK     factor  6   qty = 10 ×  6 =  60.00           │
//! │  index 2          PIECE    factor 72   qty = 10 × 72 = 720.00           │
//! │                                                                         │
//! │  apply_delta(PIECE, -72)                                                │
//! │    base delta  = -72 / 72        = -1.00                                │
//! │    base        = 10 - 1          =  9.00                                │
//! │    PACK        =  9 × 6          = 54.00   ← recomputed, never patched  │
//! │    PIECE       =  9 × 72         = 648.00                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the base quantity is ever moved directly. Every other quantity and
//! every derived money field is recomputed from it after each change, so a
//! `VariantSet` is never observed half-updated.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::quantity::{ConversionFactor, Quantity};
use crate::validation::{normalize_unit_code, validate_positive_amount, validate_price};

// =============================================================================
// Conversion
// =============================================================================

/// How a variant's quantity relates to the base quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "factor", rename_all = "snake_case")]
#[ts(export)]
pub enum Conversion {
    /// Same quantity as the base variant. The base itself is always this.
    BaseEquivalent,
    /// `quantity = base × factor`.
    Proportional(ConversionFactor),
}

impl Conversion {
    /// Maps a raw hundredths factor from older records and forms.
    ///
    /// `0` historically meant "no proportional unit" and becomes
    /// [`Conversion::BaseEquivalent`]; negatives are rejected.
    ///
    /// ```rust
    /// use stockbook_core::variant::Conversion;
    ///
    /// assert_eq!(Conversion::from_hundredths("PC", 0).unwrap(), Conversion::BaseEquivalent);
    /// assert!(Conversion::from_hundredths("PC", -1200).is_err());
    /// ```
    pub fn from_hundredths(unit_code: &str, raw: i64) -> CoreResult<Self> {
        match raw {
            0 => Ok(Conversion::BaseEquivalent),
            r if r < 0 => Err(CoreError::InvalidConversionFactor {
                unit_code: unit_code.to_string(),
                reason: format!("factor must not be negative, got {}", Quantity::from_hundredths(r)),
            }),
            r => ConversionFactor::from_hundredths(r)
                .map(Conversion::Proportional)
                .map_err(CoreError::from),
        }
    }

    /// Base quantity → quantity in this unit.
    fn scale_from_base(self, base: Quantity) -> CoreResult<Quantity> {
        match self {
            Conversion::BaseEquivalent => Ok(base),
            Conversion::Proportional(factor) => base.scale_by(factor),
        }
    }

    /// Movement in this unit → movement of the base quantity.
    fn base_delta(self, delta: Quantity) -> CoreResult<Quantity> {
        match self {
            Conversion::BaseEquivalent => Ok(delta),
            Conversion::Proportional(factor) => delta.divide_by(factor),
        }
    }
}

// =============================================================================
// Variant
// =============================================================================

/// One sellable unit of a product.
///
/// `quantity`, `total_worth` and `total_potential_revenue` are derived;
/// only [`VariantSet`] writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Variant {
    pub unit_code: String,
    pub conversion: Conversion,
    pub quantity: Quantity,
    pub sell_price: Money,
    pub low_stock_alert: Quantity,
    pub total_worth: Money,
    pub total_potential_revenue: Money,
    /// Revenue actually realised by sales of this unit.
    pub actual_revenue: Money,
}

/// Input for one variant when a product is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantSpec {
    pub unit_code: String,
    pub conversion: Conversion,
    pub sell_price: Money,
    pub low_stock_alert: Quantity,
}

/// A signed movement of one unit, as recorded in the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantDelta {
    pub unit_code: String,
    pub delta: Quantity,
}

impl VariantDelta {
    pub fn new(unit_code: impl Into<String>, delta: Quantity) -> Self {
        Self {
            unit_code: unit_code.into(),
            delta,
        }
    }
}

/// What to do when a movement would take the base quantity below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStockPolicy {
    /// Fail with [`CoreError::InsufficientStock`].
    Reject,
    /// Floor the base quantity at zero. A base already below zero is
    /// left where it is.
    Clamp,
    /// Let the quantity go negative.
    Allow,
}

impl NegativeStockPolicy {
    /// Policy for sales and transfers: reject unless overridden.
    pub fn for_movement(allow_negative: bool) -> Self {
        if allow_negative {
            NegativeStockPolicy::Allow
        } else {
            NegativeStockPolicy::Reject
        }
    }
}

// =============================================================================
// Variant Set
// =============================================================================

/// The ordered variants of one product in one branch.
///
/// ## Invariants
/// - at least one variant; index 0 is the base and is `BaseEquivalent`
/// - unit codes are normalized and unique
/// - every non-base quantity equals `base × factor` rounded to hundredths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct VariantSet {
    product: String,
    unit_cost: Money,
    variants: Vec<Variant>,
}

impl VariantSet {
    /// Builds a fresh set with the given opening base quantity.
    pub fn new(
        product: impl Into<String>,
        unit_cost: Money,
        specs: Vec<VariantSpec>,
        base_quantity: Quantity,
    ) -> CoreResult<Self> {
        let variants = specs
            .into_iter()
            .map(|spec| Variant {
                unit_code: spec.unit_code,
                conversion: spec.conversion,
                quantity: Quantity::zero(),
                sell_price: spec.sell_price,
                low_stock_alert: spec.low_stock_alert,
                total_worth: Money::zero(),
                total_potential_revenue: Money::zero(),
                actual_revenue: Money::zero(),
            })
            .collect::<Vec<_>>();

        Self::assemble(product.into(), unit_cost, variants, base_quantity)
    }

    /// Rebuilds a set from stored variants. Derived fields are recomputed
    /// from the stored base quantity; `actual_revenue` is kept.
    pub fn restore(
        product: impl Into<String>,
        unit_cost: Money,
        variants: Vec<Variant>,
    ) -> CoreResult<Self> {
        let base_quantity = variants
            .first()
            .map(|v| v.quantity)
            .unwrap_or_default();
        Self::assemble(product.into(), unit_cost, variants, base_quantity)
    }

    fn assemble(
        product: String,
        unit_cost: Money,
        mut variants: Vec<Variant>,
        base_quantity: Quantity,
    ) -> CoreResult<Self> {
        validate_price("unit_cost", unit_cost)?;

        if variants.is_empty() {
            return Err(ValidationError::required("variants").into());
        }

        let mut seen: Vec<String> = Vec::with_capacity(variants.len());
        for (index, variant) in variants.iter_mut().enumerate() {
            variant.unit_code = normalize_unit_code(&variant.unit_code)?;
            validate_price("sell_price", variant.sell_price)?;
            if variant.low_stock_alert.is_negative() {
                return Err(ValidationError::MustNotBeNegative {
                    field: "low_stock_alert".to_string(),
                }
                .into());
            }

            if index == 0 && variant.conversion != Conversion::BaseEquivalent {
                return Err(CoreError::InvalidConversionFactor {
                    unit_code: variant.unit_code.clone(),
                    reason: "the base unit cannot carry a conversion factor".to_string(),
                });
            }

            if seen.contains(&variant.unit_code) {
                return Err(ValidationError::Duplicate {
                    field: "unit_code".to_string(),
                    value: variant.unit_code.clone(),
                }
                .into());
            }
            seen.push(variant.unit_code.clone());
        }

        let variants = recompute(variants, unit_cost, base_quantity)?;

        Ok(Self {
            product,
            unit_cost,
            variants,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// The unit of record.
    pub fn base(&self) -> &Variant {
        // assemble() guarantees at least one variant
        &self.variants[0]
    }

    pub fn base_quantity(&self) -> Quantity {
        self.base().quantity
    }

    /// Finds a variant by unit code, normalizing the input first.
    pub fn find(&self, unit_code: &str) -> Option<&Variant> {
        self.position(unit_code).map(|i| &self.variants[i])
    }

    /// Like [`VariantSet::find`] but fails with `VariantNotFound`.
    pub fn get(&self, unit_code: &str) -> CoreResult<&Variant> {
        self.find(unit_code)
            .ok_or_else(|| self.not_found(unit_code))
    }

    fn position(&self, unit_code: &str) -> Option<usize> {
        let code = normalize_unit_code(unit_code).ok()?;
        self.variants.iter().position(|v| v.unit_code == code)
    }

    fn not_found(&self, unit_code: &str) -> CoreError {
        CoreError::VariantNotFound {
            product: self.product.clone(),
            unit_code: unit_code.trim().to_uppercase(),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Moves `delta` units of `unit_code` and recomputes every variant.
    ///
    /// ## User Workflow
    /// ```text
    /// sell 2 CARTON                       sell 24 PIECE (factor 12)
    ///      │                                   │
    ///      ▼                                   ▼
    /// base delta = -2                     base delta = -24 / 12 = -2
    ///      │                                   │
    ///      └───────────────┬───────────────────┘
    ///                      ▼
    ///         policy check (Reject/Clamp/Allow)
    ///                      │
    ///                      ▼
    ///         base = 8, PIECE = 8 × 12 = 96, money fields refreshed
    /// ```
    ///
    /// Returns the applied movement with its normalized unit code. On error
    /// the set is left untouched.
    pub fn apply_delta(
        &mut self,
        unit_code: &str,
        delta: Quantity,
        policy: NegativeStockPolicy,
    ) -> CoreResult<VariantDelta> {
        let index = self
            .position(unit_code)
            .ok_or_else(|| self.not_found(unit_code))?;
        let prior = self.base_quantity();
        let target = &self.variants[index];

        let base_delta = if index == 0 {
            delta
        } else {
            target.conversion.base_delta(delta)?
        };
        let mut new_base = prior.checked_add(base_delta)?;

        // increases never fail, even on a product already below zero
        let short =
            delta.is_negative() && (new_base.is_negative() || delta.abs() > target.quantity);
        if short {
            match policy {
                NegativeStockPolicy::Reject => {
                    return Err(CoreError::InsufficientStock {
                        unit_code: target.unit_code.clone(),
                        available: target.quantity,
                        requested: delta.abs(),
                    });
                }
                NegativeStockPolicy::Clamp => new_base = new_base.floor_zero().min(prior),
                NegativeStockPolicy::Allow => {}
            }
        }

        let applied = VariantDelta::new(target.unit_code.clone(), delta);
        self.variants = recompute(self.variants.clone(), self.unit_cost, new_base)?;
        Ok(applied)
    }

    /// Adds realised sale revenue to a variant.
    pub fn record_revenue(&mut self, unit_code: &str, amount: Money) -> CoreResult<()> {
        let index = self
            .position(unit_code)
            .ok_or_else(|| self.not_found(unit_code))?;
        let variant = &mut self.variants[index];
        variant.actual_revenue = variant
            .actual_revenue
            .checked_add(amount)
            .ok_or_else(|| CoreError::Overflow("actual revenue".to_string()))?;
        Ok(())
    }

    /// Changes one variant's sell price and refreshes its potential revenue.
    /// Returns the previous price.
    pub fn set_sell_price(&mut self, unit_code: &str, price: Money) -> CoreResult<Money> {
        validate_positive_amount("sell_price", price)?;
        let index = self
            .position(unit_code)
            .ok_or_else(|| self.not_found(unit_code))?;

        let mut variants = self.variants.clone();
        let old = std::mem::replace(&mut variants[index].sell_price, price);
        self.variants = recompute(variants, self.unit_cost, self.base_quantity())?;
        Ok(old)
    }

    pub fn set_low_stock_alert(&mut self, unit_code: &str, alert: Quantity) -> CoreResult<()> {
        if alert.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "low_stock_alert".to_string(),
            }
            .into());
        }
        let index = self
            .position(unit_code)
            .ok_or_else(|| self.not_found(unit_code))?;
        self.variants[index].low_stock_alert = alert;
        Ok(())
    }

    /// Replaces the base quantity outright, as after a physical count, and
    /// recomputes every variant from it.
    pub fn restate(&mut self, base_quantity: Quantity) -> CoreResult<()> {
        self.variants = recompute(self.variants.clone(), self.unit_cost, base_quantity)?;
        Ok(())
    }

    /// Same units, prices and factors under another product record, with
    /// zero stock and no revenue history.
    ///
    /// Used when a transfer reaches a branch that has never stocked the
    /// product.
    pub fn clone_structure(&self) -> CoreResult<VariantSet> {
        let variants = self
            .variants
            .iter()
            .map(|v| Variant {
                actual_revenue: Money::zero(),
                ..v.clone()
            })
            .collect();
        Self::assemble(self.product.clone(), self.unit_cost, variants, Quantity::zero())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Per-unit quantity change between two snapshots of the same product.
    ///
    /// Units present on only one side are compared against zero.
    pub fn diff(pre: &VariantSet, post: &VariantSet) -> Vec<VariantDelta> {
        post.variants
            .iter()
            .map(|after| {
                let before = pre
                    .variants
                    .iter()
                    .find(|v| v.unit_code == after.unit_code)
                    .map(|v| v.quantity)
                    .unwrap_or_default();
                VariantDelta::new(
                    after.unit_code.clone(),
                    Quantity::from_hundredths(after.quantity.hundredths() - before.hundredths()),
                )
            })
            .collect()
    }

    /// Variants at or below their alert level. An alert level of zero
    /// disables the alert.
    pub fn low_stock(&self) -> Vec<&Variant> {
        self.variants
            .iter()
            .filter(|v| v.low_stock_alert.is_positive() && v.quantity <= v.low_stock_alert)
            .collect()
    }
}

fn recompute(
    mut variants: Vec<Variant>,
    unit_cost: Money,
    base_quantity: Quantity,
) -> CoreResult<Vec<Variant>> {
    for (index, variant) in variants.iter_mut().enumerate() {
        variant.quantity = if index == 0 {
            base_quantity
        } else {
            variant.conversion.scale_from_base(base_quantity)?
        };
        variant.total_worth = unit_cost.times(variant.quantity)?;
        variant.total_potential_revenue = variant.sell_price.times(variant.quantity)?;
    }
    Ok(variants)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(code: &str, factor: Option<i64>, price_cents: i64) -> VariantSpec {
        VariantSpec {
            unit_code: code.to_string(),
            conversion: match factor {
                None => Conversion::BaseEquivalent,
                Some(f) => Conversion::Proportional(ConversionFactor::from_whole(f).unwrap()),
            },
            sell_price: Money::from_cents(price_cents),
            low_stock_alert: Quantity::zero(),
        }
    }

    fn biscuits(base: i64) -> VariantSet {
        VariantSet::new(
            "Biscuits",
            Money::from_major(300),
            vec![spec("carton", None, 36_000), spec("piece", Some(12), 3_500)],
            Quantity::from_whole(base),
        )
        .unwrap()
    }

    fn assert_consistent(set: &VariantSet) {
        let base = set.base_quantity();
        for v in &set.variants()[1..] {
            let expected = match v.conversion {
                Conversion::BaseEquivalent => base,
                Conversion::Proportional(f) => base.scale_by(f).unwrap(),
            };
            assert_eq!(v.quantity, expected, "unit {}", v.unit_code);
        }
    }

    #[test]
    fn test_new_derives_quantities() {
        let set = biscuits(10);
        assert_eq!(set.get("PIECE").unwrap().quantity, Quantity::from_whole(120));
        assert_eq!(set.base().total_worth, Money::from_major(3_000));
        assert_eq!(
            set.get("piece").unwrap().total_potential_revenue,
            Money::from_major(4_200)
        );
    }

    #[test]
    fn test_sell_base_unit() {
        let mut set = biscuits(10);
        let applied = set
            .apply_delta("Carton", Quantity::from_whole(-2), NegativeStockPolicy::Reject)
            .unwrap();

        assert_eq!(applied.unit_code, "CARTON");
        assert_eq!(set.base_quantity(), Quantity::from_whole(8));
        assert_eq!(set.get("PIECE").unwrap().quantity, Quantity::from_whole(96));
        assert_consistent(&set);
    }

    #[test]
    fn test_sell_derived_unit_converts_to_base() {
        let mut set = biscuits(10);
        set.apply_delta("piece", Quantity::from_whole(-6), NegativeStockPolicy::Reject)
            .unwrap();

        assert_eq!(set.base_quantity(), Quantity::from_hundredths(950));
        assert_eq!(set.get("PIECE").unwrap().quantity, Quantity::from_whole(114));
        assert_consistent(&set);
    }

    #[test]
    fn test_fractional_factor_rounds() {
        let mut set = biscuits(8);
        set.apply_delta("PIECE", Quantity::from_whole(-1), NegativeStockPolicy::Reject)
            .unwrap();

        // 1/12 carton rounds to 0.08
        assert_eq!(set.base_quantity(), Quantity::from_hundredths(792));
        assert_eq!(set.get("PIECE").unwrap().quantity, Quantity::from_hundredths(9_504));
        assert_consistent(&set);
    }

    #[test]
    fn test_unknown_unit() {
        let mut set = biscuits(1);
        let err = set
            .apply_delta("BOX", Quantity::from_whole(1), NegativeStockPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, CoreError::VariantNotFound { ref unit_code, .. } if unit_code == "BOX"));
    }

    #[test]
    fn test_negative_policies() {
        let mut set = biscuits(1);
        let err = set
            .apply_delta("CARTON", Quantity::from_whole(-3), NegativeStockPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
        assert_eq!(set.base_quantity(), Quantity::from_whole(1));

        let mut clamped = biscuits(1);
        clamped
            .apply_delta("CARTON", Quantity::from_whole(-3), NegativeStockPolicy::Clamp)
            .unwrap();
        assert_eq!(clamped.base_quantity(), Quantity::zero());
        assert_eq!(clamped.get("PIECE").unwrap().quantity, Quantity::zero());

        let mut allowed = biscuits(1);
        allowed
            .apply_delta("CARTON", Quantity::from_whole(-3), NegativeStockPolicy::Allow)
            .unwrap();
        assert_eq!(allowed.base_quantity(), Quantity::from_whole(-2));
        assert_eq!(allowed.get("PIECE").unwrap().quantity, Quantity::from_whole(-24));
    }

    #[test]
    fn test_clamp_never_raises_negative_stock() {
        let mut set = biscuits(1);
        set.apply_delta("CARTON", Quantity::from_whole(-4), NegativeStockPolicy::Allow)
            .unwrap();
        assert_eq!(set.base_quantity(), Quantity::from_whole(-3));

        let before = set.clone();
        set.apply_delta("CARTON", Quantity::from_whole(-1), NegativeStockPolicy::Clamp)
            .unwrap();
        assert_eq!(set.base_quantity(), Quantity::from_whole(-3));
        assert!(VariantSet::diff(&before, &set).iter().all(|d| d.delta.is_zero()));

        set.apply_delta("PIECE", Quantity::from_whole(-6), NegativeStockPolicy::Clamp)
            .unwrap();
        assert_eq!(set.get("PIECE").unwrap().quantity, Quantity::from_whole(-36));
    }

    #[test]
    fn test_reject_checks_target_unit_quantity() {
        // 0.08 cartons = 0.96 pieces; selling one whole piece must fail even
        // though the base would round to exactly zero.
        let mut set = VariantSet::new(
            "Biscuits",
            Money::zero(),
            vec![spec("CARTON", None, 0), spec("PIECE", Some(12), 0)],
            Quantity::from_hundredths(8),
        )
        .unwrap();

        let err = set
            .apply_delta("PIECE", Quantity::from_whole(-1), NegativeStockPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
    }

    #[test]
    fn test_base_equivalent_variant_mirrors_base() {
        let mut set = VariantSet::new(
            "Oil",
            Money::from_major(10),
            vec![spec("LITRE", None, 1_200), spec("BOTTLE", None, 1_300)],
            Quantity::from_whole(4),
        )
        .unwrap();
        set.apply_delta("BOTTLE", Quantity::from_whole(-1), NegativeStockPolicy::Reject)
            .unwrap();

        assert_eq!(set.base_quantity(), Quantity::from_whole(3));
        assert_eq!(set.get("BOTTLE").unwrap().quantity, Quantity::from_whole(3));
    }

    #[test]
    fn test_zero_factor_maps_to_base_equivalent() {
        assert_eq!(
            Conversion::from_hundredths("BOTTLE", 0).unwrap(),
            Conversion::BaseEquivalent
        );
        let err = Conversion::from_hundredths("BOTTLE", -5).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConversionFactor { .. }));
    }

    #[test]
    fn test_base_with_factor_rejected() {
        let err = VariantSet::new(
            "Biscuits",
            Money::zero(),
            vec![spec("CARTON", Some(2), 0)],
            Quantity::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConversionFactor { .. }));
    }

    #[test]
    fn test_duplicate_unit_codes_rejected() {
        let err = VariantSet::new(
            "Biscuits",
            Money::zero(),
            vec![spec("CARTON", None, 0), spec("carton ", Some(2), 0)],
            Quantity::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Duplicate { .. })));
    }

    #[test]
    fn test_diff() {
        let pre = biscuits(10);
        let mut post = pre.clone();
        post.apply_delta("CARTON", Quantity::from_whole(-2), NegativeStockPolicy::Reject)
            .unwrap();

        let diff = VariantSet::diff(&pre, &post);
        assert_eq!(
            diff,
            vec![
                VariantDelta::new("CARTON", Quantity::from_whole(-2)),
                VariantDelta::new("PIECE", Quantity::from_whole(-24)),
            ]
        );
    }

    #[test]
    fn test_set_sell_price_refreshes_potential_revenue() {
        let mut set = biscuits(10);
        let old = set.set_sell_price("piece", Money::from_major(40)).unwrap();

        assert_eq!(old, Money::from_major(35));
        let piece = set.get("PIECE").unwrap();
        assert_eq!(piece.sell_price, Money::from_major(40));
        assert_eq!(piece.total_potential_revenue, Money::from_major(4_800));
        assert_eq!(set.base().total_potential_revenue, Money::from_major(3_600));
        assert_eq!(set.base_quantity(), Quantity::from_whole(10));

        let err = set.set_sell_price("PIECE", Money::zero()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(set.set_sell_price("BOX", Money::from_major(1)).is_err());
        assert_eq!(set.get("PIECE").unwrap().sell_price, Money::from_major(40));
    }

    #[test]
    fn test_restate_then_diff() {
        let pre = biscuits(10);
        let mut post = pre.clone();
        post.restate(Quantity::from_whole(7)).unwrap();

        assert_eq!(post.get("PIECE").unwrap().quantity, Quantity::from_whole(84));
        assert_eq!(post.base().total_worth, Money::from_major(2_100));
        assert_eq!(
            VariantSet::diff(&pre, &post),
            vec![
                VariantDelta::new("CARTON", Quantity::from_whole(-3)),
                VariantDelta::new("PIECE", Quantity::from_whole(-36)),
            ]
        );

        post.set_low_stock_alert("carton", Quantity::from_whole(8)).unwrap();
        assert_eq!(post.low_stock().len(), 1);
        assert!(post.set_low_stock_alert("CARTON", Quantity::from_whole(-1)).is_err());
    }

    #[test]
    fn test_clone_structure_starts_empty() {
        let mut source = biscuits(10);
        source.record_revenue("CARTON", Money::from_major(720)).unwrap();

        let clone = source.clone_structure().unwrap();
        assert_eq!(clone.base_quantity(), Quantity::zero());
        assert_eq!(clone.variants().len(), 2);
        assert!(clone.variants().iter().all(|v| v.actual_revenue.is_zero()));
        assert_eq!(clone.get("PIECE").unwrap().conversion, source.get("PIECE").unwrap().conversion);
    }

    #[test]
    fn test_low_stock() {
        let mut set = VariantSet::new(
            "Biscuits",
            Money::zero(),
            vec![
                VariantSpec {
                    low_stock_alert: Quantity::from_whole(2),
                    ..spec("CARTON", None, 0)
                },
                spec("PIECE", Some(12), 0),
            ],
            Quantity::from_whole(3),
        )
        .unwrap();
        assert!(set.low_stock().is_empty());

        set.apply_delta("CARTON", Quantity::from_whole(-1), NegativeStockPolicy::Reject)
            .unwrap();
        let low = set.low_stock();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].unit_code, "CARTON");
    }

    #[test]
    fn test_restore_recomputes_derived_fields() {
        let set = biscuits(5);
        let mut stored = set.variants().to_vec();
        stored[1].quantity = Quantity::from_whole(999);
        stored[1].total_worth = Money::zero();

        let restored = VariantSet::restore("Biscuits", set.unit_cost(), stored).unwrap();
        assert_eq!(restored, set);
    }

    #[test]
    fn test_consistency_after_many_moves() {
        let mut set = VariantSet::new(
            "Biscuits",
            Money::from_cents(1_999),
            vec![
                spec("CARTON", None, 0),
                spec("PACK", Some(6), 0),
                VariantSpec {
                    conversion: Conversion::Proportional(
                        ConversionFactor::from_hundredths(7_250).unwrap(),
                    ),
                    ..spec("PIECE", None, 0)
                },
            ],
            Quantity::from_whole(50),
        )
        .unwrap();

        let moves = [("PACK", -7), ("PIECE", -13), ("CARTON", 4), ("PIECE", 29), ("PACK", -1)];
        for (unit, qty) in moves {
            set.apply_delta(unit, Quantity::from_whole(qty), NegativeStockPolicy::Reject)
                .unwrap();
            assert_consistent(&set);
        }
    }
}
