//! # Typed Requests
//!
//! Inputs to the engine's units of work. The request layer builds these
//! from forms; every request validates its own shape before any lock is
//! taken, so malformed input never touches stock or balances.
//!
//! Products are named, not identified: a product is addressed by branch
//! and name, which is also how its lock key is formed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::validation::{
    validate_movement_quantity, validate_note, validate_positive_amount, validate_price,
    validate_product_name, validate_ref_no,
};
use stockbook_core::{
    AdjustmentDirection, Conversion, CoreResult, EntryFields, Money, Quantity, ValidationError,
    VariantSpec,
};

fn validate_optional_ref(ref_no: Option<&str>) -> Result<(), ValidationError> {
    if let Some(ref_no) = ref_no {
        validate_ref_no(ref_no)?;
    }
    Ok(())
}

fn required_id(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

// =============================================================================
// Catalog
// =============================================================================

/// One variant as entered on a product form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInput {
    pub unit_code: String,
    /// Units of this variant per base unit, in hundredths. `0` means the
    /// variant tracks the base quantity one-to-one.
    pub conversion_factor: i64,
    pub sell_price: Money,
    #[serde(default)]
    pub low_stock_alert: Quantity,
}

impl VariantInput {
    /// The base unit of a product.
    pub fn base(unit_code: &str, sell_price: Money) -> Self {
        VariantInput {
            unit_code: unit_code.to_string(),
            conversion_factor: 0,
            sell_price,
            low_stock_alert: Quantity::zero(),
        }
    }

    /// A unit worth `per_base` of it per base unit (12 pieces per carton).
    pub fn per_base(unit_code: &str, per_base: i64, sell_price: Money) -> Self {
        VariantInput {
            unit_code: unit_code.to_string(),
            conversion_factor: per_base.saturating_mul(100),
            sell_price,
            low_stock_alert: Quantity::zero(),
        }
    }

    pub fn alert_at(mut self, level: Quantity) -> Self {
        self.low_stock_alert = level;
        self
    }

    pub(crate) fn into_spec(self) -> CoreResult<VariantSpec> {
        let conversion = Conversion::from_hundredths(&self.unit_code, self.conversion_factor)?;
        Ok(VariantSpec {
            unit_code: self.unit_code,
            conversion,
            sell_price: self.sell_price,
            low_stock_alert: self.low_stock_alert,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub branch_id: String,
    pub name: String,
    pub category: Option<String>,
    /// Cost of one base unit.
    pub unit_cost: Money,
    /// Base variant first.
    pub variants: Vec<VariantInput>,
    /// Opening stock in base units.
    pub opening_quantity: Quantity,
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        validate_product_name(&self.name)?;
        validate_price("unit_cost", self.unit_cost)?;
        if self.variants.is_empty() {
            return Err(ValidationError::required("variants"));
        }
        for variant in &self.variants {
            validate_price("sell_price", variant.sell_price)?;
        }
        if self.opening_quantity.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "opening_quantity".to_string(),
            });
        }
        Ok(())
    }
}

/// New alert level for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertChange {
    pub unit_code: String,
    pub low_stock_alert: Quantity,
}

/// Edits a product in place. Absent fields are left as they are.
///
/// A new `base_quantity` restates stock outright, as after a physical
/// count, and is recorded as a `product_edit` movement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditProductRequest {
    pub branch_id: String,
    pub product: String,
    pub category: Option<String>,
    pub base_quantity: Option<Quantity>,
    #[serde(default)]
    pub alerts: Vec<AlertChange>,
    pub note: Option<String>,
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl EditProductRequest {
    pub fn new(branch_id: &str, product: &str) -> Self {
        EditProductRequest {
            branch_id: branch_id.to_string(),
            product: product.to_string(),
            date: Utc::now(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        validate_product_name(&self.product)?;
        if self.category.is_none() && self.base_quantity.is_none() && self.alerts.is_empty() {
            return Err(ValidationError::required("changes"));
        }
        if self.base_quantity.is_some_and(|q| q.is_negative()) {
            return Err(ValidationError::MustNotBeNegative {
                field: "base_quantity".to_string(),
            });
        }
        for alert in &self.alerts {
            if alert.low_stock_alert.is_negative() {
                return Err(ValidationError::MustNotBeNegative {
                    field: "low_stock_alert".to_string(),
                });
            }
        }
        validate_note(self.note.as_deref())?;
        Ok(())
    }
}

/// Changes the sell price of one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustPriceRequest {
    pub branch_id: String,
    pub product: String,
    pub unit_code: String,
    pub new_price: Money,
    pub note: Option<String>,
    pub operator: Option<String>,
}

impl AdjustPriceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        validate_product_name(&self.product)?;
        validate_positive_amount("new_price", self.new_price)?;
        validate_note(self.note.as_deref())?;
        Ok(())
    }
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub product: String,
    pub unit_code: String,
    pub quantity: Quantity,
    pub unit_price: Money,
}

/// How a sale is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SalePayment {
    /// Paid in full at the counter.
    #[default]
    Cash,
    /// Charged to the customer; `paid` is the down payment taken now.
    Credit { paid: Money },
}

/// A receipt: one or more lines sold together under one reference.
///
/// ```rust
/// use stockbook_core::{Money, Quantity};
/// use stockbook_engine::requests::SaleRequest;
///
/// let request = SaleRequest::new("branch-1")
///     .line("Biscuits", "CARTON", Quantity::from_whole(2), Money::from_major(360))
///     .line("Biscuits", "PIECE", Quantity::from_whole(3), Money::from_major(35));
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub branch_id: String,
    pub lines: Vec<SaleLineRequest>,
    pub customer_id: Option<String>,
    pub payment: SalePayment,
    /// Receipt number; issued from the receipt sequence when absent.
    pub ref_no: Option<String>,
    pub date: DateTime<Utc>,
    /// Per-request negative stock override.
    pub allow_negative: bool,
    pub operator: Option<String>,
}

impl SaleRequest {
    pub fn new(branch_id: &str) -> Self {
        SaleRequest {
            branch_id: branch_id.to_string(),
            date: Utc::now(),
            ..Default::default()
        }
    }

    pub fn line(mut self, product: &str, unit_code: &str, quantity: Quantity, unit_price: Money) -> Self {
        self.lines.push(SaleLineRequest {
            product: product.to_string(),
            unit_code: unit_code.to_string(),
            quantity,
            unit_price,
        });
        self
    }

    pub fn customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn on_credit(mut self, customer_id: &str, paid: Money) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self.payment = SalePayment::Credit { paid };
        self
    }

    pub fn ref_no(mut self, ref_no: &str) -> Self {
        self.ref_no = Some(ref_no.to_string());
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn allow_negative(mut self) -> Self {
        self.allow_negative = true;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        if self.lines.is_empty() {
            return Err(ValidationError::required("lines"));
        }
        for line in &self.lines {
            validate_product_name(&line.product)?;
            validate_movement_quantity(line.quantity)?;
            validate_price("unit_price", line.unit_price)?;
        }
        if let SalePayment::Credit { paid } = self.payment {
            if self.customer_id.is_none() {
                return Err(ValidationError::required("customer_id"));
            }
            validate_price("paid", paid)?;
        }
        validate_optional_ref(self.ref_no.as_deref())
    }
}

// =============================================================================
// Purchases
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub branch_id: String,
    pub product: String,
    pub unit_code: String,
    pub quantity: Quantity,
    /// Cost of one unit of `unit_code`.
    pub unit_cost: Money,
    /// Supplier to charge; stock only when absent.
    pub supplier_id: Option<String>,
    /// Paid to the supplier on receipt.
    pub paid: Money,
    /// Invoice number; issued from the invoice sequence when absent.
    pub ref_no: Option<String>,
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl PurchaseRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        validate_product_name(&self.product)?;
        validate_movement_quantity(self.quantity)?;
        validate_price("unit_cost", self.unit_cost)?;
        validate_price("paid", self.paid)?;
        if self.supplier_id.is_none() && self.paid.is_positive() {
            return Err(ValidationError::required("supplier_id"));
        }
        validate_optional_ref(self.ref_no.as_deref())
    }
}

// =============================================================================
// Adjustments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub branch_id: String,
    pub product: String,
    pub unit_code: String,
    pub quantity: Quantity,
    pub direction: AdjustmentDirection,
    pub note: Option<String>,
    /// Without it a decrease stops at zero instead of going negative.
    #[serde(default)]
    pub allow_negative: bool,
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl AdjustRequest {
    pub fn new(
        branch_id: &str,
        product: &str,
        unit_code: &str,
        quantity: Quantity,
        direction: AdjustmentDirection,
    ) -> Self {
        AdjustRequest {
            branch_id: branch_id.to_string(),
            product: product.to_string(),
            unit_code: unit_code.to_string(),
            quantity,
            direction,
            note: None,
            allow_negative: false,
            date: Utc::now(),
            operator: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("branch_id", &self.branch_id)?;
        validate_product_name(&self.product)?;
        validate_movement_quantity(self.quantity)?;
        validate_note(self.note.as_deref())?;
        Ok(())
    }
}

// =============================================================================
// Transfers
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_branch_id: String,
    pub dest_branch_id: String,
    pub product: String,
    pub unit_code: String,
    pub quantity: Quantity,
    /// Transfer number; issued from the source branch's sequence when absent.
    pub ref_no: Option<String>,
    pub date: DateTime<Utc>,
    pub allow_negative: bool,
    pub operator: Option<String>,
}

impl TransferRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("source_branch_id", &self.source_branch_id)?;
        required_id("dest_branch_id", &self.dest_branch_id)?;
        validate_product_name(&self.product)?;
        stockbook_core::transfer::validate_transfer(
            &self.source_branch_id,
            &self.dest_branch_id,
            self.quantity,
        )?;
        validate_optional_ref(self.ref_no.as_deref())
    }
}

/// Changes the quantity of a recorded transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTransferRequest {
    pub transfer_id: String,
    pub quantity: Quantity,
    pub date: DateTime<Utc>,
    pub allow_negative: bool,
    pub operator: Option<String>,
}

impl EditTransferRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("transfer_id", &self.transfer_id)?;
        validate_movement_quantity(self.quantity)
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub account_id: String,
    /// Branch the payment was taken at; also selects the number sequence.
    pub branch_id: String,
    pub amount: Money,
    pub ref_no: Option<String>,
    pub date: DateTime<Utc>,
    pub operator: Option<String>,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("account_id", &self.account_id)?;
        required_id("branch_id", &self.branch_id)?;
        validate_positive_amount("amount", self.amount)?;
        validate_optional_ref(self.ref_no.as_deref())
    }
}

/// Replaces the business fields of one account ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntryRequest {
    pub account_id: String,
    pub ref_no: String,
    pub fields: EntryFields,
    pub operator: Option<String>,
}

impl EditEntryRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required_id("account_id", &self.account_id)?;
        validate_ref_no(&self.ref_no)?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_sale_needs_customer() {
        let mut request = SaleRequest::new("b-1").line(
            "Rice",
            "BAG",
            Quantity::from_whole(1),
            Money::from_major(100),
        );
        request.payment = SalePayment::Credit { paid: Money::zero() };
        assert_eq!(request.validate(), Err(ValidationError::required("customer_id")));

        let request = request.on_credit("c-1", Money::zero());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_sale_rejects_empty_and_zero_lines() {
        assert!(SaleRequest::new("b-1").validate().is_err());

        let request =
            SaleRequest::new("b-1").line("Rice", "BAG", Quantity::zero(), Money::from_major(1));
        assert_eq!(request.validate(), Err(ValidationError::positive("quantity")));
    }

    #[test]
    fn test_transfer_to_same_branch_rejected() {
        let request = TransferRequest {
            source_branch_id: "b-1".into(),
            dest_branch_id: "b-1".into(),
            product: "Rice".into(),
            unit_code: "BAG".into(),
            quantity: Quantity::from_whole(1),
            ..Default::default()
        };
        assert!(matches!(request.validate(), Err(ValidationError::MustDiffer { .. })));
    }

    #[test]
    fn test_variant_input_maps_zero_factor_to_base_equivalent() {
        let spec = VariantInput::base("carton", Money::from_major(10)).into_spec().unwrap();
        assert_eq!(spec.conversion, Conversion::BaseEquivalent);

        let spec = VariantInput::per_base("piece", 12, Money::from_major(1)).into_spec().unwrap();
        assert!(matches!(spec.conversion, Conversion::Proportional(_)));

        let bad = VariantInput {
            conversion_factor: -100,
            ..VariantInput::base("piece", Money::zero())
        };
        assert!(bad.into_spec().is_err());
    }

    #[test]
    fn test_product_edit_needs_a_change() {
        let request = EditProductRequest::new("b-1", "Rice");
        assert_eq!(request.validate(), Err(ValidationError::required("changes")));

        let mut request = EditProductRequest::new("b-1", "Rice");
        request.base_quantity = Some(Quantity::from_whole(-1));
        assert!(matches!(request.validate(), Err(ValidationError::MustNotBeNegative { .. })));

        request.base_quantity = Some(Quantity::zero());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_price_must_be_positive() {
        let request = AdjustPriceRequest {
            branch_id: "b-1".into(),
            product: "Rice".into(),
            unit_code: "BAG".into(),
            new_price: Money::zero(),
            ..Default::default()
        };
        assert_eq!(request.validate(), Err(ValidationError::positive("new_price")));
    }

    #[test]
    fn test_paid_purchase_needs_supplier() {
        let request = PurchaseRequest {
            branch_id: "b-1".into(),
            product: "Rice".into(),
            unit_code: "BAG".into(),
            quantity: Quantity::from_whole(5),
            paid: Money::from_major(10),
            ..Default::default()
        };
        assert_eq!(request.validate(), Err(ValidationError::required("supplier_id")));
    }
}
