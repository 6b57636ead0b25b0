//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. A billing period,
/// a prorata result or a set of invoice amounts are value objects; pivot rows,
/// which keep their identifier while their state changes, are not.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Cents(i64);
///
/// impl ValueObject for Cents {}
///
/// assert_eq!(Cents(100), Cents(100)); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
