//! # Catalog
//!
//! Branches, accounts and products: the aggregates every movement needs to
//! exist first, edits to a product after it exists, and the branch-level
//! negative stock toggle.

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use stockbook_core::validation::{validate_branch_code, validate_note, validate_product_name};
use stockbook_core::{
    Account, AccountKind, ActionKind, Branch, CoreResult, MovementContext, Particular,
    PriceAdjustment, Product, SequenceKind, StockLedgerEntry, ValidationError, VariantSet,
    VariantSpec,
};

use crate::engine::{snapshot, Engine, Movement};
use crate::error::EngineResult;
use crate::locks::LockKey;
use crate::requests::{AdjustPriceRequest, CreateProductRequest, EditProductRequest};

/// Reference carried by the opening-stock entry of a new product.
pub const OPENING_REF: &str = "OPENING";

/// Result of [`Engine::edit_product`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductEdit {
    pub product: Product,
    /// Present when quantities were restated.
    pub stock_entry: Option<StockLedgerEntry>,
}

impl Engine {
    pub async fn create_branch(&self, name: &str, code: &str) -> EngineResult<Branch> {
        if name.trim().is_empty() {
            return Err(ValidationError::required("branch name").into());
        }
        validate_branch_code(code)?;

        let mut conn = self.db.acquire().await?;
        let branch = self.db.branches().insert(&mut conn, name.trim(), code).await?;

        info!(branch_id = %branch.id, code = %branch.code, "Branch created");
        Ok(branch)
    }

    pub async fn create_account(
        &self,
        kind: AccountKind,
        branch_id: &str,
        name: &str,
        phone: Option<&str>,
    ) -> EngineResult<Account> {
        if name.trim().is_empty() {
            return Err(ValidationError::required("account name").into());
        }

        let mut tx = self.db.begin().await?;
        self.load_branch(&mut tx, branch_id).await?;
        let account = self
            .db
            .accounts()
            .insert(&mut tx, kind, branch_id, name, phone)
            .await?;
        tx.commit().await?;

        info!(account_id = %account.id, kind = kind.as_str(), "Account created");
        Ok(account)
    }

    /// Creates a product in one branch with its opening stock.
    ///
    /// The opening quantity is recorded as the product's first stock ledger
    /// entry, so history always starts from zero.
    pub async fn create_product(&self, request: CreateProductRequest) -> EngineResult<Product> {
        request.validate()?;
        let name = validate_product_name(&request.name)?;

        let specs = request
            .variants
            .into_iter()
            .map(|v| v.into_spec())
            .collect::<CoreResult<Vec<VariantSpec>>>()?;
        let set = VariantSet::new(&name, request.unit_cost, specs, request.opening_quantity)?;

        let _locks = self.locks.acquire([LockKey::stock(&request.branch_id, &name)]).await?;
        let mut tx = self.db.begin().await?;

        self.load_branch(&mut tx, &request.branch_id).await?;
        let product = self
            .db
            .products()
            .insert(&mut tx, &request.branch_id, request.category.as_deref(), &set, Utc::now())
            .await?;

        let empty = set.clone_structure()?;
        let movement = Movement {
            particular: Particular::Opening,
            ref_no: OPENING_REF,
            date: request.date,
            context: MovementContext {
                operator: request.operator.clone(),
                ..Default::default()
            },
        };
        self.record_movement(
            &mut tx,
            &product.id,
            &product.branch_id,
            &set,
            &VariantSet::diff(&empty, &set),
            &movement,
        )
        .await?;

        tx.commit().await?;

        info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    /// Applies an in-place product edit.
    ///
    /// A restated base quantity moves every variant and writes one
    /// `product_edit` stock entry carrying the per-unit difference, numbered
    /// from the adjustment sequence. Alert and category changes write no
    /// stock entry. Every edit is action-logged with both snapshots.
    pub async fn edit_product(&self, request: EditProductRequest) -> EngineResult<ProductEdit> {
        request.validate()?;
        let note = validate_note(request.note.as_deref())?;

        let _locks = self
            .locks
            .acquire([LockKey::stock(&request.branch_id, &request.product)])
            .await?;
        let mut tx = self.db.begin().await?;

        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let product = self
            .load_product(&mut tx, &branch.id, &request.product)
            .await?;

        let mut after = product.variants.clone();
        for alert in &request.alerts {
            after.set_low_stock_alert(&alert.unit_code, alert.low_stock_alert)?;
        }
        if let Some(base) = request.base_quantity {
            after.restate(base)?;
        }
        let deltas = VariantSet::diff(&product.variants, &after);

        let stock_entry = if deltas.iter().any(|d| !d.delta.is_zero()) {
            let edit_no = self
                .issue_number(&mut tx, SequenceKind::Adjustment, &branch)
                .await?;
            let movement = Movement {
                particular: Particular::ProductEdit,
                ref_no: &edit_no,
                date: request.date,
                context: MovementContext {
                    operator: request.operator.clone(),
                    counterparty: None,
                    note,
                },
            };
            Some(
                self.commit_movement(&mut tx, &product, &after, &deltas, &movement)
                    .await?,
            )
        } else {
            if after != product.variants {
                self.db
                    .products()
                    .update_variants(&mut tx, &product, &after, Utc::now())
                    .await?;
            }
            None
        };

        if let Some(category) = &request.category {
            let category = Some(category.trim()).filter(|c| !c.is_empty());
            if category != product.category.as_deref() {
                self.db
                    .products()
                    .update_category(&mut tx, &product.id, category, Utc::now())
                    .await?;
            }
        }

        let edited = self.load_product_by_id(&mut tx, &product.id).await?;
        self.log_action(
            &mut tx,
            ActionKind::ProductEdited,
            &product.id,
            Some(snapshot(&product)?),
            Some(snapshot(&edited)?),
            request.operator.as_deref(),
        )
        .await?;

        tx.commit().await?;

        info!(
            product_id = %edited.id,
            name = %edited.name,
            restated = stock_entry.is_some(),
            "Product edited"
        );
        Ok(ProductEdit {
            product: edited,
            stock_entry,
        })
    }

    /// Changes one variant's sell price and records the old and new price.
    pub async fn adjust_price(&self, request: AdjustPriceRequest) -> EngineResult<PriceAdjustment> {
        request.validate()?;
        let note = validate_note(request.note.as_deref())?;

        let _locks = self
            .locks
            .acquire([LockKey::stock(&request.branch_id, &request.product)])
            .await?;
        let mut tx = self.db.begin().await?;

        let branch = self.load_branch(&mut tx, &request.branch_id).await?;
        let product = self
            .load_product(&mut tx, &branch.id, &request.product)
            .await?;

        let mut after = product.variants.clone();
        let old_price = after.set_sell_price(&request.unit_code, request.new_price)?;
        let unit_code = after.get(&request.unit_code)?.unit_code.clone();
        self.db
            .products()
            .update_variants(&mut tx, &product, &after, Utc::now())
            .await?;

        let adjustment = PriceAdjustment {
            id: Uuid::new_v4().to_string(),
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            unit_code,
            old_price,
            new_price: request.new_price,
            note,
            operator: request.operator.clone(),
            // stored in milliseconds
            created_at: Utc::now().trunc_subsecs(3),
        };
        self.db.price_adjustments().insert(&mut tx, &adjustment).await?;

        tx.commit().await?;

        info!(
            product = %product.name,
            unit = %adjustment.unit_code,
            old_price = %old_price,
            new_price = %adjustment.new_price,
            "Sell price adjusted"
        );
        Ok(adjustment)
    }

    /// Turns the branch-wide negative stock override on or off.
    pub async fn set_allow_negative_stock(
        &self,
        branch_id: &str,
        allow: bool,
        operator: Option<&str>,
    ) -> EngineResult<Branch> {
        let mut tx = self.db.begin().await?;

        let before = self.load_branch(&mut tx, branch_id).await?;
        self.db
            .branches()
            .set_allow_negative_stock(&mut tx, branch_id, allow)
            .await?;
        let after = Branch {
            allow_negative_stock: allow,
            ..before.clone()
        };
        self.log_action(
            &mut tx,
            ActionKind::NegativeStockToggled,
            branch_id,
            Some(snapshot(&before)?),
            Some(snapshot(&after)?),
            operator,
        )
        .await?;

        tx.commit().await?;

        info!(%branch_id, allow, "Negative stock override changed");
        Ok(after)
    }

    pub async fn find_product(&self, branch_id: &str, name: &str) -> EngineResult<Option<Product>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.db.products().find_by_name(&mut conn, branch_id, name).await?)
    }

    pub async fn list_products(&self, branch_id: &str) -> EngineResult<Vec<Product>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.db.products().list_by_branch(&mut conn, branch_id).await?)
    }

    pub async fn find_account(&self, account_id: &str) -> EngineResult<Option<Account>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.db.accounts().find_by_id(&mut conn, account_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
