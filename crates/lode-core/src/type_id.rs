use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use xxhash_rust::const_xxh3::xxh3_64;

/// Stable run-time identifier of a registered type.
///
/// A `TypeId` is the xxh3 hash of the type's declared id-string, so the same
/// string always interns to the same id in every process. [`register_type`]
/// records the id → name mapping; looking up by string and by integer resolve
/// to the same id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(u64);

impl TypeId {
    /// Placeholder id carried by null [`crate::MetaHandle`]s.
    pub const NONE: Self = Self(0);

    /// Interns a type-name string into its id. Usable in `const` contexts.
    pub const fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }

    /// Initialize from an existing, serialized, source.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw hash value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns the registered name of this id, if any.
    pub fn name(self) -> Option<String> {
        type_names().read().unwrap().get(&self).cloned()
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "TypeId({name})"),
            None => write!(f, "TypeId({:016x})", self.0),
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "{:016x}", self.0),
        }
    }
}

static TYPE_NAMES: Lazy<RwLock<HashMap<TypeId, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static NAME_IDS: Lazy<RwLock<HashMap<String, TypeId>>> = Lazy::new(|| RwLock::new(HashMap::new()));

fn type_names() -> &'static RwLock<HashMap<TypeId, String>> {
    &TYPE_NAMES
}

/// Registers a name/id pair.
///
/// Re-registering the same pair is a no-op. Registering the same name with a
/// different id is a programming error and panics.
pub fn register_type(name: &str, id: TypeId) -> TypeId {
    let mut ids = NAME_IDS.write().unwrap();
    if let Some(existing) = ids.get(name) {
        assert!(
            *existing == id,
            "type name '{name}' already registered with a different id"
        );
        return id;
    }
    ids.insert(name.to_owned(), id);
    type_names().write().unwrap().insert(id, name.to_owned());
    id
}

/// Resolves a type-name string to its interned id, if registered.
pub fn resolve_type(name: &str) -> Option<TypeId> {
    NAME_IDS.read().unwrap().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_and_integer_lookup_agree() {
        let id = TypeId::from_name("lode_core_test_type");
        register_type("lode_core_test_type", id);
        assert_eq!(resolve_type("lode_core_test_type"), Some(id));
        assert_eq!(TypeId::from_raw(id.as_raw()), id);
        assert_eq!(id.name().as_deref(), Some("lode_core_test_type"));
    }

    #[test]
    fn interning_is_stable() {
        assert_eq!(TypeId::from_name("abc"), TypeId::from_name("abc"));
        assert_ne!(TypeId::from_name("abc"), TypeId::from_name("abd"));
    }

    #[test]
    fn reregistering_same_pair_is_idempotent() {
        let id = TypeId::from_name("lode_core_idempotent");
        register_type("lode_core_idempotent", id);
        register_type("lode_core_idempotent", id);
        assert_eq!(resolve_type("lode_core_idempotent"), Some(id));
    }
}
