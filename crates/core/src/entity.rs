//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products, lots, movements and batches are entities: two values with the same
/// id are the same record even if other fields differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
