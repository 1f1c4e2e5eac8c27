//! The SQLite-backed inventory store.
//!
//! ## Concurrency
//!
//! Single process, single writer. Every mutating operation takes the store's
//! write lock, runs inside one SQLite transaction, and only then (after a
//! successful commit) publishes alerts. Reads go straight to the pool.
//!
//! Inside a write transaction, helpers receive the transaction's connection
//! and never touch the pool: an in-memory store has exactly one connection.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::warn;

use stockroom_events::{EventBus, InMemoryEventBus};
use stockroom_inventory::AlertRaised;

use crate::config::StoreConfig;
use crate::db;
use crate::error::InventoryResult;
use crate::reporting::Reports;

/// Default alert bus: in-process broadcast.
pub type AlertBus = Arc<InMemoryEventBus<AlertRaised>>;

/// Handle to the inventory database. Cheap to clone; clones share the pool,
/// the write lock and the alert bus.
#[derive(Debug, Clone)]
pub struct Store<B = AlertBus> {
    pub(crate) pool: SqlitePool,
    pub(crate) write_lock: Arc<Mutex<()>>,
    bus: B,
}

impl Store<AlertBus> {
    /// Fresh in-memory store with its own in-process alert bus.
    pub async fn open_in_memory() -> InventoryResult<Self> {
        Self::open(&StoreConfig::in_memory(), Arc::new(InMemoryEventBus::new())).await
    }
}

impl<B> Store<B> {
    /// Connect, ensure the schema, and wire `bus` for low-stock alerts.
    pub async fn open(config: &StoreConfig, bus: B) -> InventoryResult<Self> {
        let pool = db::connect(config).await?;
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            bus,
        })
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Read-only reporting handle over the same database.
    pub fn reports(&self) -> Reports {
        Reports::new(self.pool.clone())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<B> Store<B>
where
    B: EventBus<AlertRaised>,
{
    /// Hand committed alerts to subscribers. The movements behind them are
    /// already durable, so a failed publish is logged and otherwise ignored.
    pub(crate) fn publish_alerts(&self, alerts: Vec<AlertRaised>) {
        for alert in alerts {
            warn!(
                product_id = %alert.product_id,
                sku = %alert.sku,
                on_hand = alert.on_hand,
                threshold = alert.threshold,
                "stock at or below reorder threshold"
            );
            if let Err(err) = self.bus.publish(alert) {
                warn!(?err, "failed to publish low-stock alert");
            }
        }
    }
}
