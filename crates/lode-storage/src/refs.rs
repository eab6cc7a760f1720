use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use lode_core::{EntityId, Guid, Handle};
use lode_reflect::{cast_handle, RefResolver};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reference to an asset: an authoritative GUID plus a cached handle.
///
/// The handle is only a cache. It may be null (unresolved) or stale, and an
/// unresolved reference never fails the operation that carries it; binding is
/// an explicit pass run once the referenced assets are loaded.
pub struct AssetRef<T> {
    /// Authoritative identity of the referenced asset.
    pub guid: Guid,
    handle: Handle<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AssetRef<T> {
    /// Creates an unresolved reference.
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            handle: Handle::null(),
            _marker: PhantomData,
        }
    }

    /// Caches a resolved handle.
    pub fn bind(&mut self, handle: Handle<T>) {
        self.handle = handle;
    }

    /// Drops the cached handle, keeping the GUID.
    pub fn unbind(&mut self) {
        self.handle = Handle::null();
    }

    /// Returns `true` if a handle is cached.
    pub fn is_bound(&self) -> bool {
        !self.handle.is_null()
    }

    /// The cached handle, if any.
    pub fn handle(&self) -> Option<Handle<T>> {
        (!self.handle.is_null()).then_some(self.handle)
    }
}

impl<T> Default for AssetRef<T> {
    fn default() -> Self {
        Self::new(Guid::INVALID)
    }
}

impl<T> Clone for AssetRef<T> {
    fn clone(&self) -> Self {
        Self {
            guid: self.guid,
            handle: self.handle,
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for AssetRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl<T> Eq for AssetRef<T> {}

impl<T> fmt::Debug for AssetRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetRef({}, {:?})", self.guid, self.handle)
    }
}

impl<T> Serialize for AssetRef<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.guid.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for AssetRef<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // A reference always deserializes unresolved; binding is a later pass.
        Ok(Self::new(Guid::deserialize(deserializer)?))
    }
}

/// Reference to an entity: a GUID plus a cached [`EntityId`], with the same
/// soft semantics as [`AssetRef`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EntityRef {
    /// Authoritative identity of the referenced entity.
    pub guid: Guid,
    /// Cached entity id, [`EntityId::NULL`] while unresolved.
    pub entity: EntityId,
}

impl EntityRef {
    /// Creates an unresolved reference.
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            entity: EntityId::NULL,
        }
    }

    /// Creates an already-bound reference.
    pub fn bound(guid: Guid, entity: EntityId) -> Self {
        Self { guid, entity }
    }

    /// Caches a resolved entity id.
    pub fn bind(&mut self, entity: EntityId) {
        self.entity = entity;
    }

    /// Drops the cached entity id, keeping the GUID.
    pub fn unbind(&mut self) {
        self.entity = EntityId::NULL;
    }

    /// Returns `true` if an entity id is cached.
    pub fn is_bound(&self) -> bool {
        self.entity.is_some()
    }
}

impl Default for EntityRef {
    fn default() -> Self {
        Self::new(Guid::INVALID)
    }
}

impl Serialize for EntityRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.guid.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::new(Guid::deserialize(deserializer)?))
    }
}

/// Registers the reflection descriptor of `AssetRef<T>` as a leaf value that
/// serializes to the bare GUID. `T` must be registered first.
pub fn register_asset_ref<T: Any + Send + Sync + Clone>(
) -> Result<&'static lode_reflect::TypeDescriptor, lode_reflect::ReflectError> {
    use lode_reflect::{of, of_mut, PrimitiveOps, Reflect, ReflectError, TypeKind};

    let inner = lode_reflect::descriptor_of::<T>()?;
    let name: &'static str =
        Box::leak(format!("AssetRef<{}>", inner.id_string).into_boxed_str());
    lode_reflect::register_descriptor(lode_reflect::TypeDescriptor {
        type_id: lode_core::TypeId::from_name(name),
        id_string: name,
        display_name: name,
        tooltip: "",
        rust_id: std::any::TypeId::of::<AssetRef<T>>(),
        flags: lode_reflect::MetaFlags::NONE,
        kind: TypeKind::Primitive(PrimitiveOps {
            to_json: |value: &dyn Reflect| {
                serde_json::to_value(of::<AssetRef<T>>(value)).map_err(ReflectError::from)
            },
            from_json: |value: &mut dyn Reflect, json| {
                *of_mut::<AssetRef<T>>(value) = serde_json::from_value(json.clone())?;
                Ok(())
            },
        }),
        make_default: || Box::new(AssetRef::<T>::default()),
        functions: std::collections::HashMap::new(),
    })
}

/// Registers the reflection descriptor of [`EntityRef`], a leaf that
/// serializes to the bare GUID.
pub fn register_entity_ref(
) -> Result<&'static lode_reflect::TypeDescriptor, lode_reflect::ReflectError> {
    use lode_reflect::{of, of_mut, PrimitiveOps, Reflect, ReflectError, TypeKind};

    lode_reflect::register_descriptor(lode_reflect::TypeDescriptor {
        type_id: lode_core::TypeId::from_name("EntityRef"),
        id_string: "EntityRef",
        display_name: "EntityRef",
        tooltip: "",
        rust_id: std::any::TypeId::of::<EntityRef>(),
        flags: lode_reflect::MetaFlags::NONE,
        kind: TypeKind::Primitive(PrimitiveOps {
            to_json: |value: &dyn Reflect| {
                serde_json::to_value(of::<EntityRef>(value)).map_err(ReflectError::from)
            },
            from_json: |value: &mut dyn Reflect, json| {
                *of_mut::<EntityRef>(value) = serde_json::from_value(json.clone())?;
                Ok(())
            },
        }),
        make_default: || Box::new(EntityRef::default()),
        functions: std::collections::HashMap::new(),
    })
}

/// Resolves one asset reference against the resolver.
///
/// Soft policy: an invalid GUID or a missing target leaves the reference
/// unbound and only logs.
pub fn bind_asset_ref<T: Any>(reference: &mut AssetRef<T>, resolver: &dyn RefResolver) {
    if !reference.guid.is_valid() {
        // Unassigned reference, nothing to resolve.
        return;
    }
    match resolver
        .resolve_asset(reference.guid)
        .and_then(cast_handle::<T>)
    {
        Some(handle) => reference.bind(handle),
        None => {
            tracing::info!(
                "could not bind asset {} ({}), leaving reference unbound",
                reference.guid,
                std::any::type_name::<T>()
            );
        }
    }
}

/// Resolves one entity reference against the resolver, with the same soft
/// policy as [`bind_asset_ref`].
pub fn bind_entity_ref(reference: &mut EntityRef, resolver: &dyn RefResolver) {
    if !reference.guid.is_valid() {
        return;
    }
    match resolver.resolve_entity(reference.guid) {
        Some(entity) => reference.bind(entity),
        None => {
            tracing::info!(
                "could not bind entity {}, leaving reference unbound",
                reference.guid
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver {
        guid: Guid,
        handle: lode_core::MetaHandle,
    }

    impl RefResolver for FixedResolver {
        fn resolve_asset(&self, guid: Guid) -> Option<lode_core::MetaHandle> {
            (guid == self.guid).then_some(self.handle)
        }

        fn resolve_entity(&self, guid: Guid) -> Option<EntityId> {
            (guid == self.guid).then_some(EntityId::from_raw(7))
        }
    }

    #[test]
    fn refs_serialize_as_their_guid() {
        let guid = Guid::from_raw(0xabcd);
        let reference = AssetRef::<u32>::new(guid);
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json, serde_json::to_value(guid).unwrap());

        let restored: AssetRef<u32> = serde_json::from_value(json).unwrap();
        assert_eq!(restored.guid, guid);
        assert!(!restored.is_bound());
    }

    #[test]
    fn missing_target_leaves_the_ref_unbound() {
        let resolver = FixedResolver {
            guid: Guid::from_raw(1),
            handle: lode_core::MetaHandle::null(),
        };
        let mut reference = EntityRef::new(Guid::from_raw(2));
        bind_entity_ref(&mut reference, &resolver);
        assert!(!reference.is_bound());

        let mut reference = EntityRef::new(Guid::from_raw(1));
        bind_entity_ref(&mut reference, &resolver);
        assert!(reference.is_bound());
        assert_eq!(reference.entity, EntityId::from_raw(7));
    }
}
