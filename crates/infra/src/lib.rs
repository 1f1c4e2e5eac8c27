//! Infrastructure layer: the SQLite store, configuration, reports and backups.

pub mod backup;
pub mod config;
mod db;
pub mod error;
mod ledger;
mod production;
mod products;
pub mod reporting;
pub mod store;


pub use config::{ConfigError, StoreConfig};
pub use error::{InventoryError, InventoryResult};
pub use reporting::{BalanceMismatch, DailyUsage, Reports, SalesSummary, StockReport};
pub use store::{AlertBus, Store};
