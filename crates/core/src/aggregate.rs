//! Aggregate root trait for state-machine-driven domain models.

/// Aggregate root marker + minimal interface.
///
/// Intentionally small: aggregates in this system are closed state machines
/// with explicit transition methods, so the trait only pins down identity and
/// version tracking.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Bumped once per applied transition; useful for optimistic store
    /// updates and audit trails.
    fn version(&self) -> u64;
}
