//! Products domain module.
//!
//! Catalog rules for raw materials and finished goods, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod product;

pub use product::{Category, NewProduct, Product, ProductFilter, ReorderPolicy};
