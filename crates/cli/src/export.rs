//! CSV export of listings and reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use stockroom_core::{BatchId, ProductId};
use stockroom_production::{BatchStatus, ProductionBatch};
use stockroom_products::{Category, Product};

/// Flat product row; `Product` nests its reorder policy.
#[derive(Debug, Serialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub category: Category,
    pub reorder_threshold: i64,
    pub reorder_quantity: i64,
    pub cost_per_unit: Option<i64>,
    pub supplier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Product> for ProductRow {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id_typed(),
            sku: p.sku().to_string(),
            name: p.name().to_string(),
            unit: p.unit().to_string(),
            category: p.category(),
            reorder_threshold: p.reorder_threshold(),
            reorder_quantity: p.reorder_quantity(),
            cost_per_unit: p.cost_per_unit(),
            supplier: p.supplier().map(str::to_string),
            created_at: p.created_at(),
        }
    }
}

/// Batch row without the consumption list.
#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub id: BatchId,
    pub batch_number: i64,
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: BatchStatus,
    pub completed_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub materials_consumed: usize,
    pub notes: Option<String>,
}

impl From<&ProductionBatch> for BatchRow {
    fn from(b: &ProductionBatch) -> Self {
        Self {
            id: b.id,
            batch_number: b.batch_number,
            product_id: b.product_id,
            quantity: b.quantity,
            status: b.status,
            completed_at: b.completed_at,
            shipped_at: b.shipped_at,
            cancelled_at: b.cancelled_at,
            materials_consumed: b.consumptions.len(),
            notes: b.notes.clone(),
        }
    }
}

/// Serialize `rows` as CSV with a header row.
pub fn write_csv<T, W>(rows: &[T], writer: W) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    let mut out = csv::Writer::from_writer(writer);
    for row in rows {
        out.serialize(row).context("failed to serialize CSV row")?;
    }
    out.flush().context("failed to flush CSV output")?;
    Ok(())
}

/// Write CSV to `path` when given, otherwise to stdout.
pub fn export<T: Serialize>(rows: &[T], path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            write_csv(rows, file)
        }
        None => write_csv(rows, io::stdout().lock()),
    }
}
