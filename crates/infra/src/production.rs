//! Recipes and production batches.
//!
//! A batch is a bundle of ledger movements committed together: optional
//! `production_consumption` of every recipe material, one `production_output`
//! of the finished good, and the batch row linking them. Shipping adds a
//! `sale`; cancelling reverses the batch's movements instead of deleting
//! anything.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use stockroom_core::{BatchId, MovementId, ProductId, RecipeId};
use stockroom_events::EventBus;
use stockroom_inventory::{AlertRaised, MovementKind, RecordMovement};
use stockroom_production::{BatchStatus, ProduceBatch, ProductionBatch, Recipe, RecipeLine};
use stockroom_products::{Category, Product};

use crate::db::{RowExt, encode_ts};
use crate::error::{InventoryError, InventoryResult, map_sqlx_error};
use crate::ledger::{apply_movement, reverse_in};
use crate::products::require_product;
use crate::store::Store;

const BATCH_COLUMNS: &str = r#"
    SELECT id, batch_number, product_id, quantity, status, notes, completed_at,
           shipped_at, cancelled_at, output_movement, closing_movement
    FROM production_batches
"#;

async fn load_recipe(conn: &mut SqliteConnection, finished_id: ProductId) -> InventoryResult<Option<Recipe>> {
    let head = sqlx::query("SELECT id, notes FROM recipes WHERE product_id = ?")
        .bind(finished_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_recipe", e))?;
    let Some(head) = head else {
        return Ok(None);
    };
    let recipe_id: RecipeId = head.id("id")?;

    let rows = sqlx::query(
        "SELECT material_id, quantity_per_unit FROM recipe_lines WHERE recipe_id = ? ORDER BY position",
    )
    .bind(recipe_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_recipe_lines", e))?;

    let lines = rows
        .iter()
        .map(|row| {
            Ok(RecipeLine {
                material_id: row.id("material_id")?,
                quantity_per_unit: row.int("quantity_per_unit")?,
            })
        })
        .collect::<InventoryResult<Vec<_>>>()?;

    Ok(Some(Recipe::restore(recipe_id, finished_id, lines, head.opt_text("notes")?)))
}

/// Resolve the finished product and each component, then validate the recipe.
async fn build_recipe(
    conn: &mut SqliteConnection,
    id: RecipeId,
    finished_id: ProductId,
    lines: &[(ProductId, i64)],
    notes: Option<String>,
) -> InventoryResult<Recipe> {
    let finished = require_product(&mut *conn, finished_id).await?;
    let mut components = Vec::with_capacity(lines.len());
    for (material_id, qty) in lines {
        components.push((require_product(&mut *conn, *material_id).await?, *qty));
    }
    Ok(Recipe::define(id, &finished, &components, notes)?)
}

async fn insert_recipe_lines(conn: &mut SqliteConnection, recipe: &Recipe) -> InventoryResult<()> {
    for (position, line) in recipe.lines().iter().enumerate() {
        sqlx::query(
            "INSERT INTO recipe_lines (recipe_id, material_id, quantity_per_unit, position) VALUES (?, ?, ?, ?)",
        )
        .bind(recipe.id_typed().to_string())
        .bind(line.material_id.to_string())
        .bind(line.quantity_per_unit)
        .bind(position as i64)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_recipe_line", e))?;
    }
    Ok(())
}

fn batch_from_row(row: &SqliteRow, consumptions: Vec<MovementId>) -> InventoryResult<ProductionBatch> {
    Ok(ProductionBatch {
        id: row.id("id")?,
        batch_number: row.int("batch_number")?,
        product_id: row.id("product_id")?,
        quantity: row.int("quantity")?,
        status: row.parsed("status")?,
        notes: row.opt_text("notes")?,
        completed_at: row.ts("completed_at")?,
        shipped_at: row.opt_ts("shipped_at")?,
        cancelled_at: row.opt_ts("cancelled_at")?,
        output_movement: row.id("output_movement")?,
        closing_movement: row.opt_id("closing_movement")?,
        consumptions,
    })
}

async fn load_consumptions<'e, E>(executor: E, batch_id: &str) -> InventoryResult<Vec<MovementId>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT c.movement_id
        FROM batch_consumptions c
        JOIN movements m ON m.id = c.movement_id
        WHERE c.batch_id = ?
        ORDER BY m.seq
        "#,
    )
    .bind(batch_id)
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("load_consumptions", e))?;
    rows.iter().map(|row| row.id("movement_id")).collect()
}

async fn load_batch(conn: &mut SqliteConnection, id: BatchId) -> InventoryResult<ProductionBatch> {
    let sql = format!("{BATCH_COLUMNS} WHERE id = ?");
    let key = id.to_string();
    let row = sqlx::query(&sql)
        .bind(&key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_batch", e))?
        .ok_or_else(|| InventoryError::not_found(format!("batch {id}")))?;
    let consumptions = load_consumptions(&mut *conn, &key).await?;
    batch_from_row(&row, consumptions)
}

/// Batches (optionally by status) in completion order, with their
/// consumptions, in one statement.
pub(crate) async fn fetch_batches(
    pool: &SqlitePool,
    status: Option<BatchStatus>,
) -> InventoryResult<Vec<ProductionBatch>> {
    let rows = sqlx::query(
        r#"
        SELECT b.id, b.batch_number, b.product_id, b.quantity, b.status, b.notes, b.completed_at,
               b.shipped_at, b.cancelled_at, b.output_movement, b.closing_movement,
               c.movement_id AS consumption
        FROM production_batches b
        LEFT JOIN batch_consumptions c ON c.batch_id = b.id
        LEFT JOIN movements m ON m.id = c.movement_id
        WHERE (?1 IS NULL OR b.status = ?1)
        ORDER BY b.completed_at, b.batch_number, m.seq
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("list_batches", e))?;

    let mut batches: Vec<ProductionBatch> = Vec::new();
    for row in &rows {
        let id: BatchId = row.id("id")?;
        if batches.last().is_none_or(|b| b.id != id) {
            batches.push(batch_from_row(row, Vec::new())?);
        }
        if let (Some(consumption), Some(batch)) = (row.opt_id::<MovementId>("consumption")?, batches.last_mut()) {
            batch.consumptions.push(consumption);
        }
    }
    Ok(batches)
}

async fn record_batch_close(
    conn: &mut SqliteConnection,
    batch: &ProductionBatch,
) -> InventoryResult<()> {
    sqlx::query(
        r#"
        UPDATE production_batches
        SET status = ?, shipped_at = ?, cancelled_at = ?, closing_movement = ?
        WHERE id = ? AND status = 'ready'
        "#,
    )
    .bind(batch.status.as_str())
    .bind(batch.shipped_at.map(encode_ts))
    .bind(batch.cancelled_at.map(encode_ts))
    .bind(batch.closing_movement.map(|m| m.to_string()))
    .bind(batch.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("close_batch", e))?;
    Ok(())
}

impl<B> Store<B> {
    /// Define the recipe for a finished good. One recipe per product.
    #[instrument(skip(self, lines, notes), fields(operation = "define_recipe"), err)]
    pub async fn define_recipe(
        &self,
        finished_id: ProductId,
        lines: &[(ProductId, i64)],
        notes: Option<String>,
    ) -> InventoryResult<Recipe> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let recipe = build_recipe(&mut *tx, RecipeId::new(), finished_id, lines, notes).await?;
        if load_recipe(&mut *tx, finished_id).await?.is_some() {
            return Err(InventoryError::conflict(format!(
                "product {finished_id} already has a recipe"
            )));
        }

        sqlx::query("INSERT INTO recipes (id, product_id, notes, created_at) VALUES (?, ?, ?, ?)")
            .bind(recipe.id_typed().to_string())
            .bind(finished_id.to_string())
            .bind(recipe.notes())
            .bind(encode_ts(Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_recipe", e))?;
        insert_recipe_lines(&mut *tx, &recipe).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(recipe_id = %recipe.id_typed(), lines = recipe.lines().len(), "recipe defined");
        Ok(recipe)
    }

    /// Swap the lines and notes of an existing recipe, keeping its id.
    #[instrument(skip(self, lines, notes), fields(operation = "replace_recipe"), err)]
    pub async fn replace_recipe(
        &self,
        finished_id: ProductId,
        lines: &[(ProductId, i64)],
        notes: Option<String>,
    ) -> InventoryResult<Recipe> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let existing = load_recipe(&mut *tx, finished_id)
            .await?
            .ok_or_else(|| InventoryError::not_found(format!("recipe for product {finished_id}")))?;
        let recipe = build_recipe(&mut *tx, existing.id_typed(), finished_id, lines, notes).await?;

        let key = recipe.id_typed().to_string();
        sqlx::query("DELETE FROM recipe_lines WHERE recipe_id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_recipe_lines", e))?;
        sqlx::query("UPDATE recipes SET notes = ? WHERE id = ?")
            .bind(recipe.notes())
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_recipe", e))?;
        insert_recipe_lines(&mut *tx, &recipe).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(recipe)
    }

    pub async fn recipe(&self, finished_id: ProductId) -> InventoryResult<Recipe> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        load_recipe(&mut conn, finished_id)
            .await?
            .ok_or_else(|| InventoryError::not_found(format!("recipe for product {finished_id}")))
    }

    #[instrument(skip(self), fields(operation = "delete_recipe"), err)]
    pub async fn delete_recipe(&self, finished_id: ProductId) -> InventoryResult<()> {
        let _guard = self.write_lock.lock().await;
        let deleted = sqlx::query("DELETE FROM recipes WHERE product_id = ?")
            .bind(finished_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_recipe", e))?;
        if deleted.rows_affected() == 0 {
            return Err(InventoryError::not_found(format!("recipe for product {finished_id}")));
        }
        Ok(())
    }

    pub async fn batch(&self, id: BatchId) -> InventoryResult<ProductionBatch> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        load_batch(&mut conn, id).await
    }

    pub async fn batches(&self, status: Option<BatchStatus>) -> InventoryResult<Vec<ProductionBatch>> {
        fetch_batches(&self.pool, status).await
    }
}

impl<B> Store<B>
where
    B: EventBus<AlertRaised>,
{
    /// Produce a batch: consume materials per the recipe (unless disabled),
    /// add the finished goods, and record the batch, all or nothing.
    #[instrument(
        skip(self, request),
        fields(operation = "produce_batch", product_id = %request.product_id, quantity = request.quantity),
        err
    )]
    pub async fn produce_batch(&self, request: ProduceBatch) -> InventoryResult<ProductionBatch> {
        request.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let product: Product = require_product(&mut *tx, request.product_id).await?;
        if product.category() != Category::FinishedGood {
            return Err(InventoryError::validation(format!(
                "{} is not a finished good",
                product.sku()
            )));
        }

        let batch_number = match request.batch_number {
            Some(number) => {
                let taken: Option<(String,)> =
                    sqlx::query_as("SELECT id FROM production_batches WHERE batch_number = ?")
                        .bind(number)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("check_batch_number", e))?;
                if taken.is_some() {
                    return Err(InventoryError::conflict(format!("batch number {number} is already taken")));
                }
                number
            }
            None => {
                let (next,): (i64,) =
                    sqlx::query_as("SELECT COALESCE(MAX(batch_number), 0) + 1 FROM production_batches")
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("next_batch_number", e))?;
                next
            }
        };
        let label = format!("batch #{batch_number}");

        let mut alerts = Vec::new();
        let mut consumptions = Vec::new();
        if request.consume_materials {
            let recipe = load_recipe(&mut *tx, request.product_id)
                .await?
                .ok_or_else(|| InventoryError::not_found(format!("recipe for {}", product.sku())))?;
            for need in recipe.requirements(request.quantity)? {
                let cmd = RecordMovement {
                    movement_id: MovementId::new(),
                    product_id: need.material_id,
                    kind: MovementKind::ProductionConsumption,
                    delta: -need.quantity,
                    occurred_at: request.completed_at,
                    reverses: None,
                };
                let applied = apply_movement(&mut *tx, cmd, Some(label.clone()), None).await?;
                consumptions.push(applied.record.id);
                alerts.extend(applied.alert);
            }
        }

        let output = RecordMovement {
            movement_id: MovementId::new(),
            product_id: request.product_id,
            kind: MovementKind::ProductionOutput,
            delta: request.quantity,
            occurred_at: request.completed_at,
            reverses: None,
        };
        let output = apply_movement(&mut *tx, output, Some(label), None).await?;

        let batch = ProductionBatch {
            id: BatchId::new(),
            batch_number,
            product_id: request.product_id,
            quantity: request.quantity,
            status: BatchStatus::Ready,
            notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            completed_at: request.completed_at,
            shipped_at: None,
            cancelled_at: None,
            output_movement: output.record.id,
            closing_movement: None,
            consumptions,
        };

        let batch_key = batch.id.to_string();
        sqlx::query(
            r#"
            INSERT INTO production_batches (
                id, batch_number, product_id, quantity, status, notes, completed_at, output_movement
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch_key)
        .bind(batch.batch_number)
        .bind(batch.product_id.to_string())
        .bind(batch.quantity)
        .bind(batch.status.as_str())
        .bind(batch.notes.as_deref())
        .bind(encode_ts(batch.completed_at))
        .bind(batch.output_movement.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_batch", e))?;

        for movement_id in &batch.consumptions {
            sqlx::query("INSERT INTO batch_consumptions (batch_id, movement_id) VALUES (?, ?)")
                .bind(&batch_key)
                .bind(movement_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_batch_consumption", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(
            batch_id = %batch.id,
            batch_number = batch.batch_number,
            consumed = batch.consumptions.len(),
            "batch produced"
        );
        self.publish_alerts(alerts);
        Ok(batch)
    }

    /// Ship a ready batch: sell its quantity of the finished good.
    #[instrument(skip(self), fields(operation = "ship_batch"), err)]
    pub async fn ship_batch(&self, batch_id: BatchId, at: DateTime<Utc>) -> InventoryResult<ProductionBatch> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut batch = load_batch(&mut *tx, batch_id).await?;
        batch.check_ship()?;

        let sale = RecordMovement {
            movement_id: MovementId::new(),
            product_id: batch.product_id,
            kind: MovementKind::Sale,
            delta: -batch.quantity,
            occurred_at: at,
            reverses: None,
        };
        let sale = apply_movement(&mut *tx, sale, Some(format!("shipped batch #{}", batch.batch_number)), None).await?;
        batch.ship(sale.record.id, at)?;
        record_batch_close(&mut *tx, &batch).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(batch_number = batch.batch_number, "batch shipped");
        self.publish_alerts(sale.alert.into_iter().collect());
        Ok(batch)
    }

    /// Cancel a ready batch: reverse its consumptions (restoring materials)
    /// and its output.
    #[instrument(skip(self), fields(operation = "cancel_batch"), err)]
    pub async fn cancel_batch(&self, batch_id: BatchId, at: DateTime<Utc>) -> InventoryResult<ProductionBatch> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut batch = load_batch(&mut *tx, batch_id).await?;
        batch.check_cancel()?;
        let note = format!("cancelled batch #{}", batch.batch_number);

        let mut alerts = Vec::new();
        for consumption in &batch.consumptions {
            let applied = reverse_in(&mut *tx, *consumption, at, Some(note.clone())).await?;
            alerts.extend(applied.alert);
        }
        let output_reversal = reverse_in(&mut *tx, batch.output_movement, at, Some(note)).await?;
        alerts.extend(output_reversal.alert);

        batch.cancel(output_reversal.record.id, at)?;
        record_batch_close(&mut *tx, &batch).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(batch_number = batch.batch_number, "batch cancelled");
        self.publish_alerts(alerts);
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_products::NewProduct;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    struct Shop {
        store: Store,
        matcha: ProductId,
        tins: ProductId,
        kit: ProductId,
    }

    async fn shop() -> Shop {
        let store = Store::open_in_memory().await.unwrap();
        let matcha = store
            .create_product(&NewProduct::raw_material("matcha-powder-1kg", "Matcha Powder", "g").with_reorder(100, 500))
            .await
            .unwrap();
        let tins = store
            .create_product(&NewProduct::raw_material("tin-30g", "Tin 30g", "pcs"))
            .await
            .unwrap();
        let kit = store
            .create_product(&NewProduct::finished_good("matcha-tin-30g", "Matcha Tin 30g", "pcs"))
            .await
            .unwrap();
        store.record_movement(matcha, MovementKind::Receipt, 1_000, at(8)).await.unwrap();
        store.record_movement(tins, MovementKind::Receipt, 40, at(8)).await.unwrap();
        store
            .define_recipe(kit, &[(matcha, 30), (tins, 1)], Some("fill and seal".into()))
            .await
            .unwrap();
        Shop { store, matcha, tins, kit }
    }

    #[tokio::test]
    async fn recipes_are_unique_and_validated() {
        let s = shop().await;
        let recipe = s.store.recipe(s.kit).await.unwrap();
        assert_eq!(recipe.lines().len(), 2);
        assert_eq!(recipe.notes(), Some("fill and seal"));

        let err = s.store.define_recipe(s.kit, &[(s.matcha, 1)], None).await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));

        let err = s.store.define_recipe(s.matcha, &[(s.tins, 1)], None).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        let err = s
            .store
            .define_recipe(s.kit, &[(ProductId::new(), 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn replace_and_delete_recipe() {
        let s = shop().await;
        let before = s.store.recipe(s.kit).await.unwrap();
        let replaced = s.store.replace_recipe(s.kit, &[(s.matcha, 25)], None).await.unwrap();
        assert_eq!(replaced.id_typed(), before.id_typed());
        assert_eq!(s.store.recipe(s.kit).await.unwrap().lines().len(), 1);

        s.store.delete_recipe(s.kit).await.unwrap();
        assert!(matches!(s.store.recipe(s.kit).await, Err(InventoryError::NotFound(_))));
        assert!(matches!(s.store.delete_recipe(s.kit).await, Err(InventoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn producing_consumes_recipe_times_quantity() {
        let s = shop().await;
        let batch = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 10, at(9)))
            .await
            .unwrap();

        assert_eq!(batch.batch_number, 1);
        assert_eq!(batch.status, BatchStatus::Ready);
        assert_eq!(batch.consumptions.len(), 2);
        assert_eq!(s.store.on_hand(s.matcha).await.unwrap(), 700);
        assert_eq!(s.store.on_hand(s.tins).await.unwrap(), 30);
        assert_eq!(s.store.on_hand(s.kit).await.unwrap(), 10);
        assert_eq!(s.store.batch(batch.id).await.unwrap(), batch);
    }

    #[tokio::test]
    async fn batch_numbers_are_assigned_and_unique() {
        let s = shop().await;
        let first = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 1, at(9)).with_batch_number(41))
            .await
            .unwrap();
        let second = s.store.produce_batch(ProduceBatch::new(s.kit, 1, at(10))).await.unwrap();
        assert_eq!(first.batch_number, 41);
        assert_eq!(second.batch_number, 42);

        let err = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 1, at(11)).with_batch_number(41))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn shortage_aborts_the_whole_batch() {
        let s = shop().await;
        let alerts = s.store.bus().subscribe();

        let err = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 41, at(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(s.store.on_hand(s.matcha).await.unwrap(), 1_000);
        assert_eq!(s.store.on_hand(s.tins).await.unwrap(), 40);
        assert_eq!(s.store.on_hand(s.kit).await.unwrap(), 0);
        assert!(s.store.batches(None).await.unwrap().is_empty());
        assert!(alerts.drain().is_empty());
    }

    #[tokio::test]
    async fn producing_without_consumption_skips_the_recipe() {
        let s = shop().await;
        s.store.delete_recipe(s.kit).await.unwrap();

        let err = s.store.produce_batch(ProduceBatch::new(s.kit, 2, at(9))).await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));

        let batch = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 2, at(9)).without_consumption())
            .await
            .unwrap();
        assert!(batch.consumptions.is_empty());
        assert_eq!(s.store.on_hand(s.matcha).await.unwrap(), 1_000);
        assert_eq!(s.store.on_hand(s.kit).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn listing_keeps_each_batch_with_its_consumptions() {
        let s = shop().await;
        let first = s.store.produce_batch(ProduceBatch::new(s.kit, 3, at(9))).await.unwrap();
        let bare = s
            .store
            .produce_batch(ProduceBatch::new(s.kit, 1, at(10)).without_consumption())
            .await
            .unwrap();
        let last = s.store.produce_batch(ProduceBatch::new(s.kit, 2, at(11))).await.unwrap();

        let listed = s.store.batches(None).await.unwrap();
        assert_eq!(listed, vec![first.clone(), bare, last.clone()]);
        assert_eq!(listed[0].consumptions.len(), 2);
        assert!(listed[1].consumptions.is_empty());

        for batch in &listed {
            assert_eq!(s.store.batch(batch.id).await.unwrap(), *batch);
        }
        assert_eq!(s.store.reports().batches(Some(BatchStatus::Ready)).await.unwrap(), listed);

        s.store.ship_batch(first.id, at(12)).await.unwrap();
        let ready = s.store.batches(Some(BatchStatus::Ready)).await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[1], last);
    }

    #[tokio::test]
    async fn ship_sells_and_closes_the_batch() {
        let s = shop().await;
        let batch = s.store.produce_batch(ProduceBatch::new(s.kit, 5, at(9))).await.unwrap();

        let shipped = s.store.ship_batch(batch.id, at(12)).await.unwrap();
        assert_eq!(shipped.status, BatchStatus::Shipped);
        assert_eq!(s.store.on_hand(s.kit).await.unwrap(), 0);

        let sale = s.store.movement(shipped.closing_movement.unwrap()).await.unwrap();
        assert_eq!(sale.kind, MovementKind::Sale);
        assert_eq!(sale.delta, -5);

        let err = s.store.cancel_batch(batch.id, at(13)).await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));
        assert_eq!(s.store.batches(Some(BatchStatus::Shipped)).await.unwrap().len(), 1);
        assert!(s.store.batches(Some(BatchStatus::Ready)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_restores_materials() {
        let s = shop().await;
        let batch = s.store.produce_batch(ProduceBatch::new(s.kit, 10, at(9))).await.unwrap();

        let cancelled = s.store.cancel_batch(batch.id, at(10)).await.unwrap();
        assert_eq!(cancelled.status, BatchStatus::Cancelled);
        assert_eq!(s.store.on_hand(s.matcha).await.unwrap(), 1_000);
        assert_eq!(s.store.on_hand(s.tins).await.unwrap(), 40);
        assert_eq!(s.store.on_hand(s.kit).await.unwrap(), 0);

        let err = s.store.ship_batch(batch.id, at(11)).await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));
        assert!(s.store.reports().audit_balances().await.unwrap().is_empty());
    }
}
