//! Compile-time field classification used by `#[derive(OwnedState)]`.
//!
//! The derive emits, with every trait below in scope:
//!
//! ```text
//! (&&&&Field(&self.field)).release_field(
//!     |key| (&&&FieldSide(key)).release_side(),
//!     |value| (&&&FieldSide(value)).release_side(),
//! )
//! ```
//!
//! Method resolution peels one reference per step, so the first applicable
//! impl wins: [`KeyedContainer`]s, then [`Reclaim`] shapes, then plain
//! [`Release`] types, then everything else as [`OwnedField::Skip`]. The two
//! closures are type-checked against the concrete key and value types at the
//! field, so each side of a mapping gets its own classification: [`Side`],
//! then [`Release`], then inert.

use super::reclaim::{reclaim_keyed, tolerate};
use super::{KeyedContainer, OwnedField, Reclaim, Release, Side, SideOutcome};
use crate::error::ReleaseError;

/// Borrowed field under classification.
pub struct Field<'a, T: ?Sized>(pub &'a T);

/// Borrowed key or value under classification.
pub struct FieldSide<'a, T: ?Sized>(pub &'a T);

/// Side classifier handed to tiers that have no keys or values.
pub type Unkeyed = fn(&()) -> SideOutcome;

/// Highest priority: mappings.
pub trait ViaKeyed {
    /// Key type of the mapping.
    type Key;
    /// Value type of the mapping.
    type Value;

    /// Releases values, then keys, and classifies the field.
    fn release_field<FK, FV>(&self, keys: FK, values: FV) -> Result<OwnedField, ReleaseError>
    where
        FK: FnMut(&Self::Key) -> SideOutcome,
        FV: FnMut(&Self::Value) -> SideOutcome;
}

/// [`Reclaim`] shapes.
pub trait ViaReclaim {
    /// Releases and classifies the field.
    fn release_field(&self, keys: Unkeyed, values: Unkeyed) -> Result<OwnedField, ReleaseError>;
}

/// Plain [`Release`] types.
pub trait ViaRelease {
    /// Releases and classifies the field.
    fn release_field(&self, keys: Unkeyed, values: Unkeyed) -> Result<OwnedField, ReleaseError>;
}

/// Fallback: never resource-bearing.
pub trait ViaSkip {
    /// Classifies the field as [`OwnedField::Skip`].
    fn release_field(&self, keys: Unkeyed, values: Unkeyed) -> Result<OwnedField, ReleaseError>;
}

impl<C: KeyedContainer + ?Sized> ViaKeyed for &&&Field<'_, C> {
    type Key = C::Key;
    type Value = C::Value;

    fn release_field<FK, FV>(&self, keys: FK, values: FV) -> Result<OwnedField, ReleaseError>
    where
        FK: FnMut(&Self::Key) -> SideOutcome,
        FV: FnMut(&Self::Value) -> SideOutcome,
    {
        reclaim_keyed(self.0, keys, values)
    }
}

impl<T: Reclaim + ?Sized> ViaReclaim for &&Field<'_, T> {
    fn release_field(&self, _: Unkeyed, _: Unkeyed) -> Result<OwnedField, ReleaseError> {
        self.0.reclaim()
    }
}

impl<T: Release + ?Sized> ViaRelease for &Field<'_, T> {
    fn release_field(&self, _: Unkeyed, _: Unkeyed) -> Result<OwnedField, ReleaseError> {
        if !self.0.holds_resource() {
            return Ok(OwnedField::Skip);
        }
        tolerate(self.0.release()).map(|()| OwnedField::SingleResource)
    }
}

impl<T: ?Sized> ViaSkip for Field<'_, T> {
    fn release_field(&self, _: Unkeyed, _: Unkeyed) -> Result<OwnedField, ReleaseError> {
        Ok(OwnedField::Skip)
    }
}

/// Declared sides: sequences, handles and [`inert_side!`](crate::inert_side) types.
pub trait ViaSide {
    /// Releases the key or value if it is resource-bearing.
    fn release_side(&self) -> SideOutcome;
}

/// Plain [`Release`] keys and values.
pub trait ViaSideRelease {
    /// Releases the key or value.
    fn release_side(&self) -> SideOutcome;
}

/// Fallback: inert.
pub trait ViaSideSkip {
    /// Always `None`.
    fn release_side(&self) -> SideOutcome;
}

impl<T: Side + ?Sized> ViaSide for &&FieldSide<'_, T> {
    fn release_side(&self) -> SideOutcome {
        self.0.side_outcome()
    }
}

impl<T: Release + ?Sized> ViaSideRelease for &FieldSide<'_, T> {
    fn release_side(&self) -> SideOutcome {
        Some(tolerate(self.0.release()))
    }
}

impl<T: ?Sized> ViaSideSkip for FieldSide<'_, T> {
    fn release_side(&self) -> SideOutcome {
        None
    }
}
