use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::TypeId;

/// Slot index inside a pool.
pub type SlotIndex = u32;
/// Per-slot version counter.
pub type SlotVersion = u32;

/// Reserved null slot index.
pub const SLOT_INDEX_NULL: SlotIndex = SlotIndex::MAX;
/// Reserved null slot version.
pub const SLOT_VERSION_NULL: SlotVersion = SlotVersion::MAX;

/// Versioned, non-owning reference to a slot in a `Pool<T>`.
///
/// A handle is only a claim: it is valid iff the pool still holds the same
/// version for its slot. A default-constructed handle is null and compares
/// unequal to every live slot.
pub struct Handle<T> {
    /// Slot index, [`SLOT_INDEX_NULL`] when null.
    pub idx: SlotIndex,
    /// Slot version, [`SLOT_VERSION_NULL`] when never assigned.
    pub ver: SlotVersion,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Creates a handle from raw parts.
    pub const fn new(idx: SlotIndex, ver: SlotVersion) -> Self {
        Self {
            idx,
            ver,
            _marker: PhantomData,
        }
    }

    /// Returns the null handle.
    pub const fn null() -> Self {
        Self::new(SLOT_INDEX_NULL, SLOT_VERSION_NULL)
    }

    /// Returns `true` if the slot index is null.
    pub const fn is_null(&self) -> bool {
        self.idx == SLOT_INDEX_NULL
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx && self.ver == other.ver
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.idx.hash(state);
        self.ver.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.idx, self.ver)
    }
}

/// Untyped handle: slot index, version and the [`TypeId`] of the pool it
/// belongs to. Casting back to a typed handle succeeds iff the type matches.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaHandle {
    /// Slot index, [`SLOT_INDEX_NULL`] when null.
    pub idx: SlotIndex,
    /// Slot version.
    pub ver: SlotVersion,
    /// Id of the pool type this handle addresses.
    pub type_id: TypeId,
}

impl MetaHandle {
    /// Creates a meta handle from raw parts.
    pub const fn new(idx: SlotIndex, ver: SlotVersion, type_id: TypeId) -> Self {
        Self { idx, ver, type_id }
    }

    /// Returns the null meta handle.
    pub const fn null() -> Self {
        Self::new(SLOT_INDEX_NULL, SLOT_VERSION_NULL, TypeId::NONE)
    }

    /// Wraps a typed handle together with its pool's type id.
    pub const fn from_handle<T>(handle: Handle<T>, type_id: TypeId) -> Self {
        Self::new(handle.idx, handle.ver, type_id)
    }

    /// Returns `true` if this handle cannot address any slot.
    pub const fn is_null(&self) -> bool {
        self.idx == SLOT_INDEX_NULL || self.type_id.as_raw() == TypeId::NONE.as_raw()
    }

    /// Casts to a typed handle iff `expected` matches the stored type id.
    pub fn cast<T>(&self, expected: TypeId) -> Option<Handle<T>> {
        (self.type_id == expected).then(|| Handle::new(self.idx, self.ver))
    }
}

impl Default for MetaHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for MetaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaHandle({}v{}:{:?})", self.idx, self.ver, self.type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn null_handle_compares_unequal_to_live() {
        let live = Handle::<Marker>::new(0, 0);
        assert_ne!(Handle::<Marker>::null(), live);
        assert!(Handle::<Marker>::null().is_null());
        assert!(!live.is_null());
    }

    #[test]
    fn cast_checks_the_type_id() {
        let ty = TypeId::from_name("marker");
        let other = TypeId::from_name("other");
        let meta = MetaHandle::from_handle(Handle::<Marker>::new(3, 1), ty);
        assert_eq!(meta.cast::<Marker>(ty), Some(Handle::new(3, 1)));
        assert_eq!(meta.cast::<Marker>(other), None);
    }
}
