//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A reorder
/// policy of `(threshold: 5, reorder_quantity: 20)` is the same policy wherever
/// it appears; to change it, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
