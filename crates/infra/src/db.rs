//! SQLite connection setup, schema, and column codecs.
//!
//! Identifiers are stored as hyphenated UUID text. Timestamps are stored as
//! fixed-width RFC 3339 UTC text with microseconds
//! (`2024-03-01T09:00:00.000000Z`), so lexical order is time order and the
//! first ten characters are the UTC calendar day.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{InventoryError, InventoryResult, map_sqlx_error};

/// Schema statements, executed in order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id                TEXT PRIMARY KEY,
        sku               TEXT NOT NULL UNIQUE CHECK (length(trim(sku)) > 0),
        name              TEXT NOT NULL CHECK (length(trim(name)) > 0),
        unit              TEXT NOT NULL CHECK (length(trim(unit)) > 0),
        category          TEXT NOT NULL CHECK (category IN ('raw_material', 'finished_good')),
        reorder_threshold INTEGER NOT NULL CHECK (reorder_threshold >= 0),
        reorder_quantity  INTEGER NOT NULL CHECK (reorder_quantity >= 0),
        cost_per_unit     INTEGER CHECK (cost_per_unit IS NULL OR cost_per_unit >= 0),
        supplier          TEXT,
        created_at        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_levels (
        product_id TEXT PRIMARY KEY REFERENCES products(id),
        on_hand    INTEGER NOT NULL CHECK (on_hand >= 0),
        version    INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        id          TEXT NOT NULL UNIQUE,
        product_id  TEXT NOT NULL REFERENCES products(id),
        kind        TEXT NOT NULL CHECK (kind IN (
                        'receipt', 'production_consumption', 'production_output', 'sale', 'adjustment')),
        delta       INTEGER NOT NULL CHECK (delta <> 0),
        occurred_at TEXT NOT NULL,
        reverses    TEXT UNIQUE REFERENCES movements(id),
        note        TEXT,
        recorded_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS movements_product_time ON movements (product_id, occurred_at)",
    r#"
    CREATE TRIGGER IF NOT EXISTS movements_no_update
    BEFORE UPDATE ON movements
    BEGIN
        SELECT RAISE(ABORT, 'movements are append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS movements_no_delete
    BEFORE DELETE ON movements
    BEGIN
        SELECT RAISE(ABORT, 'movements are append-only');
    END
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_lots (
        id                TEXT PRIMARY KEY,
        product_id        TEXT NOT NULL REFERENCES products(id),
        source_movement   TEXT NOT NULL REFERENCES movements(id),
        quantity_received INTEGER NOT NULL CHECK (quantity_received > 0),
        remaining         INTEGER NOT NULL CHECK (remaining >= 0 AND remaining <= quantity_received),
        acquired_at       TEXT NOT NULL,
        expires_at        TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS inventory_lots_product ON inventory_lots (product_id)",
    r#"
    CREATE TABLE IF NOT EXISTS recipes (
        id         TEXT PRIMARY KEY,
        product_id TEXT NOT NULL UNIQUE REFERENCES products(id),
        notes      TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS recipe_lines (
        recipe_id         TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
        material_id       TEXT NOT NULL REFERENCES products(id),
        quantity_per_unit INTEGER NOT NULL CHECK (quantity_per_unit > 0),
        position          INTEGER NOT NULL,
        PRIMARY KEY (recipe_id, material_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS production_batches (
        id               TEXT PRIMARY KEY,
        batch_number     INTEGER NOT NULL UNIQUE CHECK (batch_number > 0),
        product_id       TEXT NOT NULL REFERENCES products(id),
        quantity         INTEGER NOT NULL CHECK (quantity > 0),
        status           TEXT NOT NULL CHECK (status IN ('ready', 'shipped', 'cancelled')),
        notes            TEXT,
        completed_at     TEXT NOT NULL,
        shipped_at       TEXT,
        cancelled_at     TEXT,
        output_movement  TEXT NOT NULL REFERENCES movements(id),
        closing_movement TEXT REFERENCES movements(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batch_consumptions (
        batch_id    TEXT NOT NULL REFERENCES production_batches(id),
        movement_id TEXT NOT NULL UNIQUE REFERENCES movements(id),
        PRIMARY KEY (batch_id, movement_id)
    )
    "#,
];

/// Open a pool for `config` and bring the schema up.
///
/// File databases get WAL journaling so report readers see a committed
/// snapshot while a write is in progress. In-memory databases are pinned to a
/// single connection that is never recycled, since closing it drops the data.
pub(crate) async fn connect(config: &StoreConfig) -> InventoryResult<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    InventoryError::store("create_data_dir", format!("{}: {e}", parent.display()))
                })?;
            }
        }
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    migrate(&pool).await?;
    info!(database_url = %config.database_url, "store opened");
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> InventoryResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }
    debug!(statements = SCHEMA.len(), "schema ensured");
    Ok(())
}

/// Reject timestamps whose encoding would not be four-digit-year text.
pub(crate) fn check_storable_ts(column: &str, at: DateTime<Utc>) -> InventoryResult<()> {
    if (0..=9999).contains(&at.year()) {
        Ok(())
    } else {
        Err(InventoryError::validation(format!(
            "{column} must fall between years 0000 and 9999, got {at}"
        )))
    }
}

pub(crate) fn encode_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &str, raw: &str) -> InventoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| InventoryError::store("decode", format!("invalid timestamp in {column}: {e}")))
}

pub(crate) fn decode_day(raw: &str) -> InventoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| InventoryError::store("decode", format!("invalid day {raw:?}: {e}")))
}

pub(crate) fn decode_id<T: From<Uuid>>(column: &str, raw: &str) -> InventoryResult<T> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| InventoryError::store("decode", format!("invalid id in {column}: {e}")))
}

/// Typed column accessors over `SqliteRow`.
pub(crate) trait RowExt {
    fn text(&self, column: &str) -> InventoryResult<String>;
    fn opt_text(&self, column: &str) -> InventoryResult<Option<String>>;
    fn int(&self, column: &str) -> InventoryResult<i64>;
    fn opt_int(&self, column: &str) -> InventoryResult<Option<i64>>;

    fn id<T: From<Uuid>>(&self, column: &str) -> InventoryResult<T> {
        decode_id(column, &self.text(column)?)
    }

    fn opt_id<T: From<Uuid>>(&self, column: &str) -> InventoryResult<Option<T>> {
        self.opt_text(column)?.map(|raw| decode_id(column, &raw)).transpose()
    }

    fn ts(&self, column: &str) -> InventoryResult<DateTime<Utc>> {
        decode_ts(column, &self.text(column)?)
    }

    fn opt_ts(&self, column: &str) -> InventoryResult<Option<DateTime<Utc>>> {
        self.opt_text(column)?.map(|raw| decode_ts(column, &raw)).transpose()
    }

    fn parsed<T>(&self, column: &str) -> InventoryResult<T>
    where
        T: FromStr<Err = stockroom_core::DomainError>,
    {
        Ok(self.text(column)?.parse::<T>()?)
    }
}

impl RowExt for SqliteRow {
    fn text(&self, column: &str) -> InventoryResult<String> {
        self.try_get(column).map_err(|e| map_sqlx_error("decode", e))
    }

    fn opt_text(&self, column: &str) -> InventoryResult<Option<String>> {
        self.try_get(column).map_err(|e| map_sqlx_error("decode", e))
    }

    fn int(&self, column: &str) -> InventoryResult<i64> {
        self.try_get(column).map_err(|e| map_sqlx_error("decode", e))
    }

    fn opt_int(&self, column: &str) -> InventoryResult<Option<i64>> {
        self.try_get(column).map_err(|e| map_sqlx_error("decode", e))
    }
}
