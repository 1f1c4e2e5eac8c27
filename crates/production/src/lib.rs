//! Production domain module.
//!
//! Recipes (bills of materials) for finished goods and the production batch
//! lifecycle. Stock effects of a batch are recorded through the ledger by the
//! store; this crate only holds the rules.

pub mod batch;
pub mod recipe;

pub use batch::{BatchStatus, ProduceBatch, ProductionBatch};
pub use recipe::{MaterialRequirement, Recipe, RecipeLine};
