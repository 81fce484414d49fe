//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — two instances
/// with the same attribute values are the same value. `FilteringParameters`
/// is the canonical example here: it has no identity of its own, it *is* its
/// fields.
///
/// To "modify" a value object, construct a new one. This keeps them safe to
/// share across threads and safe to embed in sealed aggregates.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
