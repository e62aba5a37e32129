//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. They represent
/// concepts where identity doesn't matter - only the values matter
/// (`Money`, a lot key, a document number). To "modify" a value object,
/// create a new one with the new values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
