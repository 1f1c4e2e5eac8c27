//! Aggregate traits for models whose state changes are decided and applied as events.

/// Identity and version of a consistency boundary, such as one product's stock level.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// For stock levels this is the number of movements applied, and doubles as
    /// the optimistic concurrency token on the persisted counter.
    fn version(&self) -> u64;
}

/// Pure decide/evolve pair: `handle` checks a command against current state and
/// returns the resulting events; `apply` folds one event into state.
///
/// No IO happens here. The store loads state, calls `handle`, persists, then
/// applies.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    /// Must not mutate state; a rejected command leaves nothing to undo.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
