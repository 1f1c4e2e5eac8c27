//! Read-only reporting queries.
//!
//! Each report is a single SQL statement, so it reads one committed snapshot
//! even while a write is in flight (WAL mode for file databases). `Reports`
//! has no write methods.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use tracing::instrument;

use stockroom_core::ProductId;
use stockroom_production::{BatchStatus, ProductionBatch};
use stockroom_products::Category;

use crate::db::{RowExt, decode_day, encode_ts};
use crate::error::{InventoryError, InventoryResult, map_sqlx_error};
use crate::production::fetch_batches;
use crate::products::require_product;

/// A product and its current on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockReport {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub category: Category,
    pub on_hand: i64,
    pub reorder_threshold: i64,
    pub reorder_quantity: i64,
}

impl StockReport {
    pub fn is_low(&self) -> bool {
        self.on_hand <= self.reorder_threshold
    }

    /// How far below (or at) the threshold the product sits; negative when
    /// comfortably stocked.
    pub fn shortfall(&self) -> i64 {
        self.reorder_threshold - self.on_hand
    }
}

/// Net stock change of one product on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub net_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity_sold: i64,
}

/// A product whose counter, ledger sum and lot sum disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub product_id: ProductId,
    pub sku: String,
    pub on_hand: i64,
    pub ledger_sum: i64,
    pub lot_sum: i64,
}

const STOCK_REPORT_SQL: &str = r#"
    SELECT p.id, p.sku, p.name, p.unit, p.category, s.on_hand,
           p.reorder_threshold, p.reorder_quantity
    FROM products p
    JOIN stock_levels s ON s.product_id = p.id
"#;

fn stock_report_from_row(row: &SqliteRow) -> InventoryResult<StockReport> {
    Ok(StockReport {
        product_id: row.id("id")?,
        sku: row.text("sku")?,
        name: row.text("name")?,
        unit: row.text("unit")?,
        category: row.parsed("category")?,
        on_hand: row.int("on_hand")?,
        reorder_threshold: row.int("reorder_threshold")?,
        reorder_quantity: row.int("reorder_quantity")?,
    })
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> InventoryResult<()> {
    if end < start {
        return Err(InventoryError::validation(format!(
            "report window ends ({end}) before it starts ({start})"
        )));
    }
    Ok(())
}

/// Cloneable read-only handle for reports.
#[derive(Debug, Clone)]
pub struct Reports {
    pool: SqlitePool,
}

impl Reports {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every product with its on-hand quantity, by category then name.
    #[instrument(skip(self), fields(operation = "current_stock_levels"), err)]
    pub async fn current_stock_levels(&self) -> InventoryResult<Vec<StockReport>> {
        let sql = format!("{STOCK_REPORT_SQL} ORDER BY p.category, p.name, p.sku");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_stock_levels", e))?;
        rows.iter().map(stock_report_from_row).collect()
    }

    /// Products at or below their reorder threshold, largest shortfall first.
    #[instrument(skip(self), fields(operation = "low_stock_products"), err)]
    pub async fn low_stock_products(&self) -> InventoryResult<Vec<StockReport>> {
        let sql = format!(
            r#"{STOCK_REPORT_SQL}
            WHERE s.on_hand <= p.reorder_threshold
            ORDER BY (p.reorder_threshold - s.on_hand) DESC, p.name, p.sku
            "#
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("low_stock_products", e))?;
        rows.iter().map(stock_report_from_row).collect()
    }

    /// Net delta per UTC day over `[start, end)`, ascending. Days without
    /// movements are omitted.
    #[instrument(skip(self), fields(operation = "usage_over_period"), err)]
    pub async fn usage_over_period(
        &self,
        product_id: ProductId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InventoryResult<Vec<DailyUsage>> {
        check_window(start, end)?;
        require_product(&self.pool, product_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT substr(occurred_at, 1, 10) AS day, SUM(delta) AS net_delta
            FROM movements
            WHERE product_id = ? AND occurred_at >= ? AND occurred_at < ?
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(product_id.to_string())
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("usage_over_period", e))?;

        rows.iter()
            .map(|row| {
                Ok(DailyUsage {
                    date: decode_day(&row.text("day")?)?,
                    net_delta: row.int("net_delta")?,
                })
            })
            .collect()
    }

    /// Units sold per product over `[start, end)`, net of reversed sales.
    #[instrument(skip(self), fields(operation = "sales_summary"), err)]
    pub async fn sales_summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InventoryResult<Vec<SalesSummary>> {
        check_window(start, end)?;

        let rows = sqlx::query(
            r#"
            SELECT p.id, p.sku, p.name, -SUM(m.delta) AS quantity_sold
            FROM movements m
            JOIN products p ON p.id = m.product_id
            WHERE m.kind = 'sale' AND m.occurred_at >= ? AND m.occurred_at < ?
            GROUP BY p.id, p.sku, p.name
            HAVING SUM(m.delta) <> 0
            ORDER BY quantity_sold DESC, p.sku
            "#,
        )
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sales_summary", e))?;

        rows.iter()
            .map(|row| {
                Ok(SalesSummary {
                    product_id: row.id("id")?,
                    sku: row.text("sku")?,
                    name: row.text("name")?,
                    quantity_sold: row.int("quantity_sold")?,
                })
            })
            .collect()
    }

    /// Products whose materialized counter disagrees with the movement log or
    /// with their lots. Empty when the books balance.
    #[instrument(skip(self), fields(operation = "audit_balances"), err)]
    pub async fn audit_balances(&self) -> InventoryResult<Vec<BalanceMismatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, on_hand, ledger_sum, lot_sum
            FROM (
                SELECT p.id, p.sku, s.on_hand,
                       COALESCE((SELECT SUM(m.delta) FROM movements m WHERE m.product_id = p.id), 0) AS ledger_sum,
                       COALESCE((SELECT SUM(l.remaining) FROM inventory_lots l WHERE l.product_id = p.id), 0) AS lot_sum
                FROM products p
                JOIN stock_levels s ON s.product_id = p.id
            )
            WHERE on_hand <> ledger_sum OR on_hand <> lot_sum
            ORDER BY sku
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_balances", e))?;

        rows.iter()
            .map(|row| {
                Ok(BalanceMismatch {
                    product_id: row.id("id")?,
                    sku: row.text("sku")?,
                    on_hand: row.int("on_hand")?,
                    ledger_sum: row.int("ledger_sum")?,
                    lot_sum: row.int("lot_sum")?,
                })
            })
            .collect()
    }

    /// Production batches, optionally filtered by status, in completion order.
    pub async fn batches(&self, status: Option<BatchStatus>) -> InventoryResult<Vec<ProductionBatch>> {
        fetch_batches(&self.pool, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_inventory::MovementKind;
    use stockroom_products::NewProduct;

    use crate::store::Store;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    async fn product(store: &Store, sku: &str, name: &str, threshold: i64) -> ProductId {
        store
            .create_product(&NewProduct::raw_material(sku, name, "g").with_reorder(threshold, 10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn low_stock_is_ordered_by_shortfall() {
        let store = Store::open_in_memory().await.unwrap();
        let a = product(&store, "a", "Azuki", 5).await;
        let b = product(&store, "b", "Barley", 10).await;
        let c = product(&store, "c", "Cacao", 2).await;
        store.record_movement(a, MovementKind::Receipt, 4, at(1, 9)).await.unwrap();
        store.record_movement(b, MovementKind::Receipt, 3, at(1, 9)).await.unwrap();
        store.record_movement(c, MovementKind::Receipt, 9, at(1, 9)).await.unwrap();

        let reports = store.reports();
        let low = reports.low_stock_products().await.unwrap();
        let skus: Vec<_> = low.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, vec!["b", "a"]);
        assert_eq!(low[0].shortfall(), 7);
        assert!(low.iter().all(StockReport::is_low));

        let all = reports.current_stock_levels().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().find(|r| r.product_id == c).unwrap().on_hand, 9);
    }

    #[tokio::test]
    async fn usage_groups_by_day_and_skips_empty_days() {
        let store = Store::open_in_memory().await.unwrap();
        let id = product(&store, "matcha", "Matcha", 0).await;
        store.record_movement(id, MovementKind::Receipt, 50, at(1, 8)).await.unwrap();
        store.record_movement(id, MovementKind::Sale, -5, at(1, 17)).await.unwrap();
        store.record_movement(id, MovementKind::Sale, -7, at(3, 10)).await.unwrap();
        store.record_movement(id, MovementKind::Sale, -1, at(5, 10)).await.unwrap();

        let usage = store
            .reports()
            .usage_over_period(id, at(1, 0), at(5, 0))
            .await
            .unwrap();
        assert_eq!(
            usage,
            vec![
                DailyUsage { date: day(1), net_delta: 45 },
                DailyUsage { date: day(3), net_delta: -7 },
            ]
        );
    }

    #[tokio::test]
    async fn usage_rejects_bad_windows_and_unknown_products() {
        let store = Store::open_in_memory().await.unwrap();
        let id = product(&store, "matcha", "Matcha", 0).await;
        let reports = store.reports();

        let err = reports.usage_over_period(id, at(2, 0), at(1, 0)).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        let err = reports
            .usage_over_period(ProductId::new(), at(1, 0), at(2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));

        assert!(reports.usage_over_period(id, at(1, 0), at(1, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sales_summary_nets_reversals() {
        let store = Store::open_in_memory().await.unwrap();
        let tea = product(&store, "tea", "Tea", 0).await;
        let cups = product(&store, "cups", "Cups", 0).await;
        let lids = product(&store, "lids", "Lids", 0).await;
        for id in [tea, cups, lids] {
            store.record_movement(id, MovementKind::Receipt, 100, at(1, 8)).await.unwrap();
        }
        store.record_movement(tea, MovementKind::Sale, -4, at(1, 9)).await.unwrap();
        store.record_movement(cups, MovementKind::Sale, -9, at(1, 9)).await.unwrap();
        let oops = store.record_movement(lids, MovementKind::Sale, -3, at(1, 9)).await.unwrap();
        store.reverse_movement(oops.id, at(1, 10)).await.unwrap();
        store.record_movement(tea, MovementKind::Sale, -2, at(2, 9)).await.unwrap();

        let summary = store.reports().sales_summary(at(1, 0), at(2, 0)).await.unwrap();
        let rows: Vec<_> = summary.iter().map(|s| (s.sku.as_str(), s.quantity_sold)).collect();
        assert_eq!(rows, vec![("cups", 9), ("tea", 4)]);
    }

    #[tokio::test]
    async fn audit_flags_a_drifted_counter() {
        let store = Store::open_in_memory().await.unwrap();
        let id = product(&store, "matcha", "Matcha", 0).await;
        store.record_movement(id, MovementKind::Receipt, 10, at(1, 9)).await.unwrap();
        assert!(store.reports().audit_balances().await.unwrap().is_empty());

        sqlx::query("UPDATE stock_levels SET on_hand = 12")
            .execute(&store.pool)
            .await
            .unwrap();
        let drift = store.reports().audit_balances().await.unwrap();
        assert_eq!(
            drift,
            vec![BalanceMismatch {
                product_id: id,
                sku: "matcha".into(),
                on_hand: 12,
                ledger_sum: 10,
                lot_sum: 10,
            }]
        );
    }
}
