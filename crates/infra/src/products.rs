//! Product catalog persistence.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Sqlite};
use tracing::{info, instrument};

use stockroom_core::ProductId;
use stockroom_products::{NewProduct, Product, ProductFilter, ReorderPolicy};

use crate::db::{RowExt, encode_ts};
use crate::error::{InventoryError, InventoryResult, map_sqlx_error};
use crate::store::Store;

const PRODUCT_COLUMNS: &str = r#"
    SELECT id, sku, name, unit, category, reorder_threshold, reorder_quantity,
           cost_per_unit, supplier, created_at
    FROM products
"#;

pub(crate) fn product_from_row(row: &SqliteRow) -> InventoryResult<Product> {
    let policy = ReorderPolicy::new(row.int("reorder_threshold")?, row.int("reorder_quantity")?)?;
    Ok(Product::restore(
        row.id("id")?,
        row.text("sku")?,
        row.text("name")?,
        row.text("unit")?,
        row.parsed("category")?,
        policy,
        row.opt_int("cost_per_unit")?,
        row.opt_text("supplier")?,
        row.ts("created_at")?,
    ))
}

/// Load one product through any executor (pool or open transaction).
pub(crate) async fn load_product<'e, E>(executor: E, id: ProductId) -> InventoryResult<Option<Product>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{PRODUCT_COLUMNS} WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("load_product", e))?;
    row.as_ref().map(product_from_row).transpose()
}

pub(crate) async fn require_product<'e, E>(executor: E, id: ProductId) -> InventoryResult<Product>
where
    E: Executor<'e, Database = Sqlite>,
{
    load_product(executor, id)
        .await?
        .ok_or_else(|| InventoryError::not_found(format!("product {id}")))
}

impl<B> Store<B> {
    /// Create a product and its zeroed stock level in one transaction.
    #[instrument(skip(self, spec), fields(operation = "create_product", sku = %spec.sku), err)]
    pub async fn create_product(&self, spec: &NewProduct) -> InventoryResult<ProductId> {
        let product = Product::create(ProductId::new(), spec, Utc::now())?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM products WHERE sku = ?")
            .bind(product.sku())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("check_sku", e))?;
        if exists.is_some() {
            return Err(InventoryError::conflict(format!("SKU {} already exists", product.sku())));
        }

        let id = product.id_typed().to_string();
        let created_at = encode_ts(product.created_at());
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, unit, category, reorder_threshold, reorder_quantity,
                cost_per_unit, supplier, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(product.sku())
        .bind(product.name())
        .bind(product.unit())
        .bind(product.category().as_str())
        .bind(product.reorder_threshold())
        .bind(product.reorder_quantity())
        .bind(product.cost_per_unit())
        .bind(product.supplier())
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        sqlx::query("INSERT INTO stock_levels (product_id, on_hand, version, updated_at) VALUES (?, 0, 0, ?)")
            .bind(&id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_stock_level", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(product_id = %id, category = %product.category(), "product created");
        Ok(product.id_typed())
    }

    #[instrument(skip(self), fields(operation = "get_product"), err)]
    pub async fn get_product(&self, id: ProductId) -> InventoryResult<Product> {
        require_product(&self.pool, id).await
    }

    #[instrument(skip(self), fields(operation = "product_by_sku"), err)]
    pub async fn product_by_sku(&self, sku: &str) -> InventoryResult<Product> {
        let sql = format!("{PRODUCT_COLUMNS} WHERE sku = ?");
        let row = sqlx::query(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("product_by_sku", e))?
            .ok_or_else(|| InventoryError::not_found(format!("product with SKU {sku}")))?;
        product_from_row(&row)
    }

    /// Products matching `filter`, ordered by category then name.
    ///
    /// Category narrows the query; the search term is applied by
    /// [`ProductFilter::matches`] since SQLite's `lower()` only folds ASCII.
    #[instrument(skip(self), fields(operation = "list_products"), err)]
    pub async fn list_products(&self, filter: &ProductFilter) -> InventoryResult<Vec<Product>> {
        let sql = format!(
            r#"{PRODUCT_COLUMNS}
            WHERE (?1 IS NULL OR category = ?1)
            ORDER BY category, name, sku
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.category.map(|c| c.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let mut products = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            if filter.matches(&product) {
                products.push(product);
            }
        }
        Ok(products)
    }

    /// Replace a product's reorder policy. Does not raise alerts by itself;
    /// the next movement is judged against the new threshold.
    #[instrument(skip(self), fields(operation = "update_reorder_policy"), err)]
    pub async fn update_reorder_policy(&self, id: ProductId, policy: ReorderPolicy) -> InventoryResult<Product> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut product = require_product(&mut *tx, id).await?;
        product.update_reorder_policy(policy);

        sqlx::query("UPDATE products SET reorder_threshold = ?, reorder_quantity = ? WHERE id = ?")
            .bind(policy.threshold())
            .bind(policy.reorder_quantity())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_reorder_policy", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    /// Delete a product that nothing references yet (no movements, no recipe
    /// use, no batches).
    #[instrument(skip(self), fields(operation = "delete_product"), err)]
    pub async fn delete_product(&self, id: ProductId) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let product = require_product(&mut *tx, id).await?;
        let key = id.to_string();

        let (references,): (i64,) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM movements WHERE product_id = ?1)
              + (SELECT COUNT(*) FROM recipes WHERE product_id = ?1)
              + (SELECT COUNT(*) FROM recipe_lines WHERE material_id = ?1)
              + (SELECT COUNT(*) FROM production_batches WHERE product_id = ?1)
            "#,
        )
        .bind(&key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("count_references", e))?;
        if references > 0 {
            return Err(InventoryError::conflict(format!(
                "product {} is referenced by movements or recipes",
                product.sku()
            )));
        }

        sqlx::query("DELETE FROM stock_levels WHERE product_id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_stock_level", e))?;
        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(sku = %product.sku(), "product deleted");
        Ok(())
    }
}
