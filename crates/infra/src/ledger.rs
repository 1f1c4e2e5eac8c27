//! Stock ledger persistence: append-only movements, the materialized on-hand
//! counter, and lots.
//!
//! Every movement is applied by [`apply_movement`] inside the caller's
//! transaction:
//! 1. Load the product's `StockLevel` (counter + reorder policy)
//! 2. Run the aggregate's rules (sign rule, no negative stock, alert edge)
//! 3. Append the movement row
//! 4. Update the counter, checked against the version read in step 1
//! 5. Open a lot (positive delta) or draw lots down FIFO (negative delta)
//!
//! Any failure drops the transaction, which rolls everything back.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use stockroom_core::{Aggregate, AggregateRoot, MovementId, ProductId};
use stockroom_events::EventBus;
use stockroom_inventory::{
    AlertRaised, InventoryLot, MovementKind, MovementRecord, NewMovement, RecordMovement,
    StockCommand, StockEvent, StockLevel, plan_drawdown,
};
use stockroom_products::ReorderPolicy;

use crate::db::{RowExt, check_storable_ts, encode_ts};
use crate::error::{InventoryError, InventoryResult, map_sqlx_error};
use crate::products::require_product;
use crate::store::Store;

const MOVEMENT_COLUMNS: &str = r#"
    SELECT seq, id, product_id, kind, delta, occurred_at, reverses, note
    FROM movements
"#;

const LOT_COLUMNS: &str = r#"
    SELECT id, product_id, source_movement, quantity_received, remaining, acquired_at, expires_at
    FROM inventory_lots
"#;

/// Outcome of one applied movement, before commit.
#[derive(Debug, Clone)]
pub(crate) struct Applied {
    pub record: MovementRecord,
    pub alert: Option<AlertRaised>,
}

pub(crate) fn movement_from_row(row: &SqliteRow) -> InventoryResult<MovementRecord> {
    Ok(MovementRecord {
        id: row.id("id")?,
        sequence: row.int("seq")?,
        product_id: row.id("product_id")?,
        kind: row.parsed("kind")?,
        delta: row.int("delta")?,
        occurred_at: row.ts("occurred_at")?,
        reverses: row.opt_id("reverses")?,
        note: row.opt_text("note")?,
    })
}

fn lot_from_row(row: &SqliteRow) -> InventoryResult<InventoryLot> {
    Ok(InventoryLot {
        id: row.id("id")?,
        product_id: row.id("product_id")?,
        source_movement: row.id("source_movement")?,
        quantity_received: row.int("quantity_received")?,
        remaining: row.int("remaining")?,
        acquired_at: row.ts("acquired_at")?,
        expires_at: row.opt_ts("expires_at")?,
    })
}

pub(crate) async fn load_movement<'e, E>(executor: E, id: MovementId) -> InventoryResult<MovementRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{MOVEMENT_COLUMNS} WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("load_movement", e))?
        .ok_or_else(|| InventoryError::not_found(format!("movement {id}")))?;
    movement_from_row(&row)
}

async fn load_stock_level<'e, E>(executor: E, product_id: ProductId) -> InventoryResult<StockLevel>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT s.on_hand, s.version, p.sku, p.reorder_threshold, p.reorder_quantity
        FROM stock_levels s
        JOIN products p ON p.id = s.product_id
        WHERE s.product_id = ?
        "#,
    )
    .bind(product_id.to_string())
    .fetch_optional(executor)
    .await
    .map_err(|e| map_sqlx_error("load_stock_level", e))?
    .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))?;

    let policy = ReorderPolicy::new(row.int("reorder_threshold")?, row.int("reorder_quantity")?)?;
    Ok(StockLevel::rehydrate(
        product_id,
        row.text("sku")?,
        row.int("on_hand")?,
        policy,
        row.int("version")? as u64,
    ))
}

async fn open_lots(conn: &mut SqliteConnection, product_id: ProductId) -> InventoryResult<Vec<InventoryLot>> {
    let sql = format!("{LOT_COLUMNS} WHERE product_id = ? AND remaining > 0");
    let rows = sqlx::query(&sql)
        .bind(product_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_open_lots", e))?;
    rows.iter().map(lot_from_row).collect()
}

/// Apply one movement on `conn` (an open transaction). See the module docs.
pub(crate) async fn apply_movement(
    conn: &mut SqliteConnection,
    cmd: RecordMovement,
    note: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> InventoryResult<Applied> {
    check_storable_ts("occurred_at", cmd.occurred_at)?;
    if let Some(expires_at) = expires_at {
        check_storable_ts("expires_at", expires_at)?;
    }
    let level = load_stock_level(&mut *conn, cmd.product_id).await?;
    let events = level.handle(&StockCommand::Record(cmd.clone()))?;

    let mut after = level.clone();
    let mut alert = None;
    for event in &events {
        after.apply(event);
        if let StockEvent::AlertRaised(raised) = event {
            alert = Some(raised.clone());
        }
    }

    let movement_key = cmd.movement_id.to_string();
    let product_key = cmd.product_id.to_string();
    let occurred_at = encode_ts(cmd.occurred_at);

    let inserted = sqlx::query(
        r#"
        INSERT INTO movements (id, product_id, kind, delta, occurred_at, reverses, note, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&movement_key)
    .bind(&product_key)
    .bind(cmd.kind.as_str())
    .bind(cmd.delta)
    .bind(&occurred_at)
    .bind(cmd.reverses.map(|r| r.to_string()))
    .bind(note.as_deref())
    .bind(encode_ts(Utc::now()))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    let sequence = inserted.last_insert_rowid();

    let updated = sqlx::query(
        "UPDATE stock_levels SET on_hand = ?, version = version + 1, updated_at = ? WHERE product_id = ? AND version = ?",
    )
    .bind(after.on_hand())
    .bind(&occurred_at)
    .bind(&product_key)
    .bind(level.version() as i64)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update_stock_level", e))?;
    if updated.rows_affected() == 0 {
        return Err(InventoryError::conflict(format!(
            "stock level for {} changed concurrently",
            level.sku()
        )));
    }

    if cmd.delta > 0 {
        let lot = InventoryLot::open(cmd.product_id, cmd.movement_id, cmd.delta, cmd.occurred_at, expires_at)?;
        sqlx::query(
            r#"
            INSERT INTO inventory_lots (
                id, product_id, source_movement, quantity_received, remaining, acquired_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lot.id.to_string())
        .bind(&product_key)
        .bind(&movement_key)
        .bind(lot.quantity_received)
        .bind(lot.remaining)
        .bind(encode_ts(lot.acquired_at))
        .bind(lot.expires_at.map(encode_ts))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_lot", e))?;
    } else {
        let lots = open_lots(conn, cmd.product_id).await?;
        for draw in plan_drawdown(&lots, -cmd.delta)? {
            sqlx::query("UPDATE inventory_lots SET remaining = ? WHERE id = ?")
                .bind(draw.remaining_after)
                .bind(draw.lot_id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("draw_lot", e))?;
        }
    }

    Ok(Applied {
        record: MovementRecord {
            id: cmd.movement_id,
            sequence,
            product_id: cmd.product_id,
            kind: cmd.kind,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
            reverses: cmd.reverses,
            note,
        },
        alert,
    })
}

/// Insert the compensating movement for `target` on `conn`.
///
/// A compensation keeps the original's kind and negates its delta. It cannot
/// itself be reversed, and each movement can be reversed once.
pub(crate) async fn reverse_in(
    conn: &mut SqliteConnection,
    target: MovementId,
    occurred_at: DateTime<Utc>,
    note: Option<String>,
) -> InventoryResult<Applied> {
    let original = load_movement(&mut *conn, target).await?;
    if original.is_compensation() {
        return Err(InventoryError::validation(format!(
            "movement {target} is a compensation and cannot be reversed"
        )));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM movements WHERE reverses = ?")
        .bind(target.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("check_reversal", e))?;
    if existing.is_some() {
        return Err(InventoryError::conflict(format!("movement {target} has already been reversed")));
    }

    let cmd = RecordMovement {
        movement_id: MovementId::new(),
        product_id: original.product_id,
        kind: original.kind,
        delta: original
            .delta
            .checked_neg()
            .ok_or_else(|| InventoryError::validation("quantity out of range"))?,
        occurred_at,
        reverses: Some(target),
    };
    apply_movement(conn, cmd, note.or_else(|| Some(format!("reversal of {target}"))), None).await
}

impl<B> Store<B>
where
    B: EventBus<AlertRaised>,
{
    /// Record an original movement of `delta` units of `product_id`.
    pub async fn record_movement(
        &self,
        product_id: ProductId,
        kind: MovementKind,
        delta: i64,
        occurred_at: DateTime<Utc>,
    ) -> InventoryResult<MovementRecord> {
        self.record(NewMovement::new(product_id, kind, delta, occurred_at)).await
    }

    /// Record an original movement with an optional note and lot expiry.
    #[instrument(
        skip(self, movement),
        fields(
            operation = "record_movement",
            product_id = %movement.product_id,
            kind = %movement.kind,
            delta = movement.delta
        ),
        err
    )]
    pub async fn record(&self, movement: NewMovement) -> InventoryResult<MovementRecord> {
        let cmd = RecordMovement {
            movement_id: MovementId::new(),
            product_id: movement.product_id,
            kind: movement.kind,
            delta: movement.delta,
            occurred_at: movement.occurred_at,
            reverses: None,
        };

        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let applied = apply_movement(&mut *tx, cmd, movement.note, movement.expires_at).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(
            movement_id = %applied.record.id,
            sequence = applied.record.sequence,
            "movement recorded"
        );
        self.publish_alerts(applied.alert.into_iter().collect());
        Ok(applied.record)
    }

    /// Compensate an earlier movement with its negation.
    #[instrument(skip(self), fields(operation = "reverse_movement"), err)]
    pub async fn reverse_movement(
        &self,
        movement_id: MovementId,
        occurred_at: DateTime<Utc>,
    ) -> InventoryResult<MovementRecord> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let applied = reverse_in(&mut *tx, movement_id, occurred_at, None).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(reversal_id = %applied.record.id, "movement reversed");
        self.publish_alerts(applied.alert.into_iter().collect());
        Ok(applied.record)
    }
}

impl<B> Store<B> {
    #[instrument(skip(self), fields(operation = "on_hand"), err)]
    pub async fn on_hand(&self, product_id: ProductId) -> InventoryResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT on_hand FROM stock_levels WHERE product_id = ?")
            .bind(product_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("on_hand", e))?;
        row.map(|(n,)| n)
            .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))
    }

    /// Current counter, policy and version for a product.
    pub async fn stock_level(&self, product_id: ProductId) -> InventoryResult<StockLevel> {
        load_stock_level(&self.pool, product_id).await
    }

    pub async fn movement(&self, id: MovementId) -> InventoryResult<MovementRecord> {
        load_movement(&self.pool, id).await
    }

    /// All movements for a product in insertion order.
    #[instrument(skip(self), fields(operation = "movement_history"), err)]
    pub async fn movement_history(&self, product_id: ProductId) -> InventoryResult<Vec<MovementRecord>> {
        require_product(&self.pool, product_id).await?;
        let sql = format!("{MOVEMENT_COLUMNS} WHERE product_id = ? ORDER BY seq ASC");
        let rows = sqlx::query(&sql)
            .bind(product_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("movement_history", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    /// Every lot of a product (exhausted ones included) in drawdown order.
    pub async fn lots(&self, product_id: ProductId) -> InventoryResult<Vec<InventoryLot>> {
        require_product(&self.pool, product_id).await?;
        let sql = format!(
            "{LOT_COLUMNS} WHERE product_id = ? ORDER BY expires_at IS NULL, expires_at, acquired_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("lots", e))?;
        rows.iter().map(lot_from_row).collect()
    }
}
