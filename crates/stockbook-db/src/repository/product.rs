//! # Product Repository
//!
//! Per-branch products and their variant snapshots.
//!
//! ## Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How a Product Row Is Stored                          │
//! │                                                                         │
//! │  Product { variants: VariantSet { CARTON 8.00, PIECE 96.00 } }         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  products                                                              │
//! │  ├── name_key       "biscuits"  ← UNIQUE per branch                    │
//! │  ├── unit_cost_cents                                                   │
//! │  ├── variants_json  [{"unit_code":"CARTON",...},{...}]                 │
//! │  └── version        bumped on every write                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Reading back: VariantSet::restore recomputes every derived field      │
//! │  from the stored base quantity                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{from_millis, new_id};
use stockbook_core::validation::product_key;
use stockbook_core::{Money, Product, Variant, VariantSet};

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    branch_id: String,
    name: String,
    category: Option<String>,
    unit_cost_cents: i64,
    variants_json: String,
    version: i64,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl ProductRow {
    fn into_product(self) -> DbResult<Product> {
        let variants: Vec<Variant> = serde_json::from_str(&self.variants_json)
            .map_err(|e| DbError::corrupt("product", &self.id, e))?;
        let set = VariantSet::restore(
            self.name.clone(),
            Money::from_cents(self.unit_cost_cents),
            variants,
        )
        .map_err(|e| DbError::corrupt("product", &self.id, e))?;

        Ok(Product {
            created_at: from_millis(self.created_at_ms, "product", &self.id)?,
            updated_at: from_millis(self.updated_at_ms, "product", &self.id)?,
            id: self.id,
            branch_id: self.branch_id,
            name: self.name,
            category: self.category,
            variants: set,
            version: self.version,
        })
    }
}

const SELECT_PRODUCT: &str = r#"
    SELECT id, branch_id, name, category, unit_cost_cents, variants_json,
           version, created_at_ms, updated_at_ms
    FROM products
"#;

fn encode_variants(product_id: &str, set: &VariantSet) -> DbResult<String> {
    serde_json::to_string(set.variants()).map_err(|e| DbError::corrupt("product", product_id, e))
}

/// Repository for per-branch products.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// let product = db.products().find_by_name(&mut tx, &branch_id, "Biscuits").await?;
/// let version = db.products().update_variants(&mut tx, &product, &after, now).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductRepository;

impl ProductRepository {
    /// Inserts a product in a branch. The name is taken from the set.
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        category: Option<&str>,
        set: &VariantSet,
        now: DateTime<Utc>,
    ) -> DbResult<Product> {
        let id = new_id();
        let name = set.product().to_string();
        let variants_json = encode_variants(&id, set)?;

        debug!(id = %id, branch_id = %branch_id, name = %name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, branch_id, name, name_key, category, unit_cost_cents,
                variants_json, version, created_at_ms, updated_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
            "#,
        )
        .bind(&id)
        .bind(branch_id)
        .bind(&name)
        .bind(product_key(&name))
        .bind(category)
        .bind(set.unit_cost().cents())
        .bind(&variants_json)
        .bind(now.timestamp_millis())
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_value("product", &name))?;

        // Round-trip through milliseconds so callers see what a reload sees
        let stamp = from_millis(now.timestamp_millis(), "product", &id)?;
        Ok(Product {
            id,
            branch_id: branch_id.to_string(),
            name,
            category: category.map(str::to_string),
            variants: set.clone(),
            version: 1,
            created_at: stamp,
            updated_at: stamp,
        })
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(ProductRow::into_product).transpose()
    }

    /// Looks a product up by name within one branch, ignoring case and
    /// repeated whitespace.
    pub async fn find_by_name(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        name: &str,
    ) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE branch_id = ?1 AND name_key = ?2"
        ))
        .bind(branch_id)
        .bind(product_key(name))
        .fetch_optional(&mut *conn)
        .await?;

        row.map(ProductRow::into_product).transpose()
    }

    pub async fn list_by_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE branch_id = ?1 ORDER BY name_key"
        ))
        .bind(branch_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(ProductRow::into_product).collect()
    }

    /// Writes a new variant snapshot for `product`.
    ///
    /// The write only lands if the row still carries `product.version`;
    /// otherwise it fails with [`DbError::Conflict`]. Returns the new
    /// version.
    pub async fn update_variants(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
        set: &VariantSet,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let variants_json = encode_variants(&product.id, set)?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET variants_json = ?1, unit_cost_cents = ?2,
                version = version + 1, updated_at_ms = ?3
            WHERE id = ?4 AND version = ?5
            "#,
        )
        .bind(&variants_json)
        .bind(set.unit_cost().cents())
        .bind(now.timestamp_millis())
        .bind(&product.id)
        .bind(product.version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                product_id = %product.id,
                version = product.version,
                "Product changed since it was read"
            );
            return Err(DbError::conflict("product", &product.id));
        }

        debug!(product_id = %product.id, version = product.version + 1, "Variants updated");
        Ok(product.version + 1)
    }

    /// Changes the category. Variants and version are left alone.
    pub async fn update_category(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET category = ?1, updated_at_ms = ?2 WHERE id = ?3",
        )
        .bind(category)
        .bind(now.timestamp_millis())
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("product", product_id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
