use std::any::Any;

use lode_core::{EntityId, Guid, MetaHandle, TypeId};
use serde_json::Value;
use xxhash_rust::const_xxh3::xxh3_64;

use crate::{MetaFieldPath, Purpose, Reflect, ReflectError};

/// Interned name of a reflected function, the xxh3 hash of its name string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FnName(u64);

impl FnName {
    /// Interns a function name. Usable in `const` contexts.
    pub const fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }
}

/// `serialize`
pub const FN_SERIALIZE: FnName = FnName::from_name("serialize");
/// `deserialize`
pub const FN_DESERIALIZE: FnName = FnName::from_name("deserialize");
/// `inspect`
pub const FN_INSPECT: FnName = FnName::from_name("inspect");
/// `clone`
pub const FN_CLONE: FnName = FnName::from_name("clone");
/// `assure_storage`
pub const FN_ASSURE_STORAGE: FnName = FnName::from_name("assure_storage");
/// `assure_component_storage`
pub const FN_ASSURE_COMPONENT_STORAGE: FnName = FnName::from_name("assure_component_storage");
/// `load_asset`
pub const FN_LOAD_ASSET: FnName = FnName::from_name("load_asset");
/// `unload_asset`
pub const FN_UNLOAD_ASSET: FnName = FnName::from_name("unload_asset");
/// `bind_asset`
pub const FN_BIND_ASSET: FnName = FnName::from_name("bind_asset");
/// `unbind_asset`
pub const FN_UNBIND_ASSET: FnName = FnName::from_name("unbind_asset");
/// `validate_asset`
pub const FN_VALIDATE_ASSET: FnName = FnName::from_name("validate_asset");
/// `validate_asset_recursive`
pub const FN_VALIDATE_ASSET_RECURSIVE: FnName = FnName::from_name("validate_asset_recursive");
/// `collect_asset_guids`
pub const FN_COLLECT_ASSET_GUIDS: FnName = FnName::from_name("collect_asset_guids");
/// `bind_asset_refs`
pub const FN_BIND_ASSET_REFS: FnName = FnName::from_name("bind_asset_refs");
/// `bind_entity_refs`
pub const FN_BIND_ENTITY_REFS: FnName = FnName::from_name("bind_entity_refs");
/// `post_assign`
pub const FN_POST_ASSIGN: FnName = FnName::from_name("post_assign");

/// Extra arguments available to custom deserializers.
#[derive(Default)]
pub struct DeserializeCtx<'a> {
    /// Entity the value is being deserialized for, when it is a component.
    pub entity: EntityId,
    /// Caller-defined context.
    pub user: Option<&'a mut dyn Any>,
}

/// Resolves authoritative GUIDs to their current cached bindings.
///
/// Binding is soft: a `None` result leaves the reference unbound and never
/// fails the surrounding operation.
pub trait RefResolver {
    /// Looks up the current handle of an asset GUID.
    fn resolve_asset(&self, guid: Guid) -> Option<MetaHandle>;

    /// Looks up the current entity of an entity GUID.
    fn resolve_entity(&self, guid: Guid) -> Option<EntityId>;
}

/// A function registered on a type and invoked by name.
///
/// The call site accepts heterogeneous argument sets; the callee declares its
/// signature at registration time by picking the variant. Context parameters
/// that would otherwise create crate cycles (the storage, the resource
/// manager) travel as `&mut dyn Any` and are downcast by the callee.
#[derive(Clone, Copy)]
pub enum TypeFn {
    /// Purpose-aware custom serializer.
    Serialize(fn(&dyn Reflect, Purpose) -> Result<Value, ReflectError>),
    /// Legacy custom serializer without a purpose argument.
    SerializeLegacy(fn(&dyn Reflect) -> Result<Value, ReflectError>),
    /// Custom deserializer.
    Deserialize(fn(&Value, &mut dyn Reflect) -> Result<(), ReflectError>),
    /// Custom deserializer taking the deserialization context.
    DeserializeInContext(
        fn(&Value, &mut dyn Reflect, &mut DeserializeCtx<'_>) -> Result<(), ReflectError>,
    ),
    /// Custom inspection tree producer.
    Inspect(fn(&dyn Reflect) -> Result<Value, ReflectError>),
    /// Custom clone.
    Clone(fn(&dyn Reflect) -> Box<dyn Reflect>),
    /// Ensures a pool for the type exists; the argument is the storage.
    AssureStorage(fn(&dyn Any) -> Result<TypeId, ReflectError>),
    /// Ensures component storage exists; the argument is the entity registry.
    AssureComponentStorage(fn(&mut dyn Any) -> Result<(), ReflectError>),
    /// Loads the asset behind a GUID; the argument is the asset environment.
    LoadAsset(fn(&dyn Any, Guid) -> Result<(), ReflectError>),
    /// Unloads the asset behind a GUID.
    UnloadAsset(fn(&dyn Any, Guid) -> Result<(), ReflectError>),
    /// Binds the loaded asset's internal references.
    BindAsset(fn(&dyn Any, Guid) -> Result<(), ReflectError>),
    /// Unbinds the loaded asset's internal references.
    UnbindAsset(fn(&dyn Any, Guid) -> Result<(), ReflectError>),
    /// Checks that the asset's cached handle is still valid.
    ValidateAsset(fn(&dyn Any, Guid) -> bool),
    /// Checks the asset and, transitively, the assets it references.
    ValidateAssetRecursive(fn(&dyn Any, Guid) -> bool),
    /// Appends the asset GUIDs referenced by the value.
    CollectAssetGuids(fn(&dyn Reflect, &mut Vec<Guid>)),
    /// Re-resolves the value's asset references against the resolver.
    BindAssetRefs(fn(&mut dyn Reflect, &dyn RefResolver)),
    /// Re-resolves the value's entity references against the resolver.
    BindEntityRefs(fn(&mut dyn Reflect, &dyn RefResolver)),
    /// Runs after a successful path-addressed field assignment.
    PostAssign(fn(&mut dyn Reflect, &MetaFieldPath, bool)),
}
