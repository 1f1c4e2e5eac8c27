//! Inventory domain module.
//!
//! Stock-movement bookkeeping rules: movement kinds and their sign rules, the
//! per-product `StockLevel` aggregate, edge-triggered low-stock alerts, and
//! FIFO lot drawdown. Deterministic domain logic only (no IO, no storage).

pub mod alert;
pub mod lot;
pub mod movement;
pub mod stock;

pub use alert::{AlertRaised, crosses_into_low};
pub use lot::{InventoryLot, LotDraw, fifo_order, plan_drawdown};
pub use movement::{MovementKind, MovementRecord, NewMovement};
pub use stock::{MovementApplied, RecordMovement, StockCommand, StockEvent, StockLevel};
