//! Descriptor registration for the supported container shapes.
//!
//! Element and key types must be registered before the container; the
//! container's id-string is derived from theirs.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use lode_core::TypeId;
use serde_json::Value;

use crate::{
    descriptor_of, deserialize_value, of, of_mut, register_descriptor, MapOps, MetaFlags, Reflect,
    ReflectError, SequenceOps, TypeDescriptor, TypeKind,
};

fn leak_str(text: String) -> &'static str {
    Box::leak(text.into_boxed_str())
}

fn map_get_mut_json<'a, K, V>(
    value: &'a mut dyn Reflect,
    key_json: &Value,
) -> Result<&'a mut dyn Reflect, ReflectError>
where
    K: Any + Send + Sync + Clone + Default + Ord,
    V: Any + Send + Sync + Clone + Default,
{
    let mut key = K::default();
    deserialize_value(key_json, &mut key)?;
    of_mut::<BTreeMap<K, V>>(value)
        .get_mut(&key)
        .map(|mapped| mapped as &mut dyn Reflect)
        .ok_or_else(|| ReflectError::KeyNotFound(key_json.to_string(), "map"))
}

fn set_get_mut_json<'a>(
    _value: &'a mut dyn Reflect,
    key_json: &Value,
) -> Result<&'a mut dyn Reflect, ReflectError> {
    Err(ReflectError::KeyNotFound(key_json.to_string(), "set"))
}

/// Registers `Vec<T>` as a resizable sequence.
pub fn register_vec<T>() -> Result<&'static TypeDescriptor, ReflectError>
where
    T: Any + Send + Sync + Clone + Default,
{
    let inner = descriptor_of::<T>()?;
    let name = leak_str(format!("Vec<{}>", inner.id_string));
    register_descriptor(TypeDescriptor {
        type_id: TypeId::from_name(name),
        id_string: name,
        display_name: name,
        tooltip: "",
        rust_id: std::any::TypeId::of::<Vec<T>>(),
        flags: MetaFlags::NONE,
        kind: TypeKind::Sequence(SequenceOps {
            len: |value| of::<Vec<T>>(value).len(),
            get: |value, index| {
                of::<Vec<T>>(value)
                    .get(index)
                    .map(|element| element as &dyn Reflect)
            },
            get_mut: |value, index| {
                of_mut::<Vec<T>>(value)
                    .get_mut(index)
                    .map(|element| element as &mut dyn Reflect)
            },
            resize: |value, len| {
                of_mut::<Vec<T>>(value).resize_with(len, T::default);
                Ok(())
            },
            clear: |value| {
                of_mut::<Vec<T>>(value).clear();
                Ok(())
            },
        }),
        make_default: || Box::new(Vec::<T>::new()),
        functions: HashMap::new(),
    })
}

/// Registers `[T; N]` as a fixed-size sequence.
///
/// The resize operation only accepts the array's own length, which lets the
/// deserializer's resize-then-fill pass work unchanged on fixed arrays.
pub fn register_array<T, const N: usize>() -> Result<&'static TypeDescriptor, ReflectError>
where
    T: Any + Send + Sync + Clone + Default,
{
    let inner = descriptor_of::<T>()?;
    let name = leak_str(format!("[{}; {}]", inner.id_string, N));
    register_descriptor(TypeDescriptor {
        type_id: TypeId::from_name(name),
        id_string: name,
        display_name: name,
        tooltip: "",
        rust_id: std::any::TypeId::of::<[T; N]>(),
        flags: MetaFlags::NONE,
        kind: TypeKind::Sequence(SequenceOps {
            len: |_value| N,
            get: |value, index| {
                of::<[T; N]>(value)
                    .get(index)
                    .map(|element| element as &dyn Reflect)
            },
            get_mut: |value, index| {
                of_mut::<[T; N]>(value)
                    .get_mut(index)
                    .map(|element| element as &mut dyn Reflect)
            },
            resize: |_value, len| {
                if len == N {
                    Ok(())
                } else {
                    Err(ReflectError::SequenceResize(len, "fixed-size array"))
                }
            },
            clear: |_value| Err(ReflectError::SequenceResize(0, "fixed-size array")),
        }),
        make_default: || Box::new(std::array::from_fn::<T, N, _>(|_| T::default())),
        functions: HashMap::new(),
    })
}

/// Registers `BTreeMap<K, V>` as a mapped associative container.
pub fn register_btree_map<K, V>() -> Result<&'static TypeDescriptor, ReflectError>
where
    K: Any + Send + Sync + Clone + Default + Ord,
    V: Any + Send + Sync + Clone + Default,
{
    let key = descriptor_of::<K>()?;
    let mapped = descriptor_of::<V>()?;
    let name = leak_str(format!("Map<{}, {}>", key.id_string, mapped.id_string));
    register_descriptor(TypeDescriptor {
        type_id: TypeId::from_name(name),
        id_string: name,
        display_name: name,
        tooltip: "",
        rust_id: std::any::TypeId::of::<BTreeMap<K, V>>(),
        flags: MetaFlags::NONE,
        kind: TypeKind::Map(MapOps {
            is_set: false,
            len: |value| of::<BTreeMap<K, V>>(value).len(),
            clear: |value| of_mut::<BTreeMap<K, V>>(value).clear(),
            visit: |value, visitor| {
                for (key, mapped) in of::<BTreeMap<K, V>>(value) {
                    visitor(key as &dyn Reflect, Some(mapped as &dyn Reflect));
                }
            },
            insert_json: |value, key_json, mapped_json| {
                let mapped_json =
                    mapped_json.ok_or(ReflectError::UnexpectedJson("[key, value] pair", "map"))?;
                let mut key = K::default();
                deserialize_value(key_json, &mut key)?;
                let mut mapped = V::default();
                deserialize_value(mapped_json, &mut mapped)?;
                of_mut::<BTreeMap<K, V>>(value).insert(key, mapped);
                Ok(())
            },
            get_mut_json: map_get_mut_json::<K, V>,
        }),
        make_default: || Box::new(BTreeMap::<K, V>::new()),
        functions: HashMap::new(),
    })
}

/// Registers `BTreeSet<K>` as a set-like associative container.
pub fn register_btree_set<K>() -> Result<&'static TypeDescriptor, ReflectError>
where
    K: Any + Send + Sync + Clone + Default + Ord,
{
    let key = descriptor_of::<K>()?;
    let name = leak_str(format!("Set<{}>", key.id_string));
    register_descriptor(TypeDescriptor {
        type_id: TypeId::from_name(name),
        id_string: name,
        display_name: name,
        tooltip: "",
        rust_id: std::any::TypeId::of::<BTreeSet<K>>(),
        flags: MetaFlags::NONE,
        kind: TypeKind::Map(MapOps {
            is_set: true,
            len: |value| of::<BTreeSet<K>>(value).len(),
            clear: |value| of_mut::<BTreeSet<K>>(value).clear(),
            visit: |value, visitor| {
                for key in of::<BTreeSet<K>>(value) {
                    visitor(key as &dyn Reflect, None);
                }
            },
            insert_json: |value, key_json, _mapped_json| {
                let mut key = K::default();
                deserialize_value(key_json, &mut key)?;
                of_mut::<BTreeSet<K>>(value).insert(key);
                Ok(())
            },
            get_mut_json: set_get_mut_json,
        }),
        make_default: || Box::new(BTreeSet::<K>::new()),
        functions: HashMap::new(),
    })
}
