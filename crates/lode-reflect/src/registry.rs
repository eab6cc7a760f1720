use std::any::Any;
use std::collections::HashMap;
use std::sync::RwLock;

use lode_core::{Handle, MetaHandle, TypeId};
use once_cell::sync::Lazy;

use crate::{Reflect, ReflectError, TypeDescriptor};

pub(crate) struct RegistryInner {
    by_rust: HashMap<std::any::TypeId, &'static TypeDescriptor>,
    by_id: HashMap<TypeId, &'static TypeDescriptor>,
    sealed: bool,
}

static REGISTRY: Lazy<RwLock<RegistryInner>> = Lazy::new(|| {
    let mut inner = RegistryInner {
        by_rust: HashMap::new(),
        by_id: HashMap::new(),
        sealed: false,
    };
    crate::primitives::register_builtin(&mut inner);
    RwLock::new(inner)
});

pub(crate) fn insert_descriptor(
    inner: &mut RegistryInner,
    desc: TypeDescriptor,
) -> Result<&'static TypeDescriptor, ReflectError> {
    if desc.id_string.is_empty() {
        return Err(ReflectError::Registration("empty type id-string".into()));
    }
    if let Some(existing) = inner.by_rust.get(&desc.rust_id) {
        if existing.type_id == desc.type_id {
            // Re-registration of the same type is a no-op.
            return Ok(existing);
        }
        return Err(ReflectError::Registration(format!(
            "type already registered as '{}', refusing '{}'",
            existing.id_string, desc.id_string
        )));
    }
    if let Some(other) = inner.by_id.get(&desc.type_id) {
        return Err(ReflectError::Registration(format!(
            "id-string '{}' already names another type",
            other.id_string
        )));
    }

    lode_core::register_type(desc.id_string, desc.type_id);
    tracing::debug!("registered type '{}'", desc.id_string);

    let desc: &'static TypeDescriptor = Box::leak(Box::new(desc));
    inner.by_rust.insert(desc.rust_id, desc);
    inner.by_id.insert(desc.type_id, desc);
    Ok(desc)
}

/// Registers a fully built descriptor.
///
/// Writers run only during single-threaded initialization; registering after
/// [`seal`] is a programming error and panics.
pub fn register_descriptor(desc: TypeDescriptor) -> Result<&'static TypeDescriptor, ReflectError> {
    let mut inner = REGISTRY.write().unwrap();
    assert!(!inner.sealed, "type registration after registry seal");
    insert_descriptor(&mut inner, desc)
}

/// Marks the end of single-threaded initialization. One-shot; any later
/// registration panics.
pub fn seal_registry() {
    REGISTRY.write().unwrap().sealed = true;
}

/// Returns `true` once [`seal_registry`] has run.
pub fn registry_sealed() -> bool {
    REGISTRY.read().unwrap().sealed
}

/// Resolves the descriptor of a value by its dynamic type.
pub fn descriptor_of_value(value: &dyn Reflect) -> Result<&'static TypeDescriptor, ReflectError> {
    REGISTRY
        .read()
        .unwrap()
        .by_rust
        .get(&value.as_any().type_id())
        .copied()
        .ok_or_else(|| ReflectError::TypeNotRegistered("<dynamic value>".into()))
}

/// Resolves the descriptor of a compile-time type.
pub fn descriptor_of<T: Any>() -> Result<&'static TypeDescriptor, ReflectError> {
    REGISTRY
        .read()
        .unwrap()
        .by_rust
        .get(&std::any::TypeId::of::<T>())
        .copied()
        .ok_or_else(|| ReflectError::TypeNotRegistered(std::any::type_name::<T>().into()))
}

/// Resolves a descriptor by interned type id.
pub fn descriptor_by_id(type_id: TypeId) -> Result<&'static TypeDescriptor, ReflectError> {
    REGISTRY
        .read()
        .unwrap()
        .by_id
        .get(&type_id)
        .copied()
        .ok_or(ReflectError::TypeIdNotRegistered(type_id))
}

/// Resolves a descriptor by its id-string.
pub fn descriptor_by_name(name: &str) -> Result<&'static TypeDescriptor, ReflectError> {
    lode_core::resolve_type(name)
        .ok_or_else(|| ReflectError::TypeNotRegistered(name.into()))
        .and_then(descriptor_by_id)
}

/// Returns the interned type id of `T`, if registered.
pub fn type_id_of<T: Any>() -> Option<TypeId> {
    descriptor_of::<T>().ok().map(|desc| desc.type_id)
}

/// Casts an untyped handle back to `Handle<T>`, checking `T`'s registered id.
pub fn cast_handle<T: Any>(handle: MetaHandle) -> Option<Handle<T>> {
    type_id_of::<T>().and_then(|type_id| handle.cast(type_id))
}
