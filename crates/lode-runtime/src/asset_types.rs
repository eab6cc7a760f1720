use std::any::Any;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use lode_core::{EntityId, Guid, TypeId};
use lode_reflect::{
    descriptor_by_id, deserialize_value, RefResolver, ReflectError, TypeBuilder, TypeFn,
    FN_ASSURE_STORAGE, FN_BIND_ASSET, FN_BIND_ASSET_REFS, FN_COLLECT_ASSET_GUIDS, FN_LOAD_ASSET,
    FN_UNBIND_ASSET, FN_UNLOAD_ASSET, FN_VALIDATE_ASSET, FN_VALIDATE_ASSET_RECURSIVE,
};
use lode_storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AssetIndex, AssetIndexEntry, ResourceError};

/// On-disk form of one asset: identity header plus the reflected payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssetFile {
    /// Asset identity.
    pub guid: Guid,
    /// Registered id-string of the payload type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Human-readable asset name.
    pub name: String,
    /// Reflected payload, serialized under the file purpose.
    pub data: Value,
}

impl AssetFile {
    /// Reads and parses an asset file.
    pub fn read(path: &Path) -> Result<Self, ResourceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ResourceError::Io(path.display().to_string(), err.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Pretty-prints the asset to a file.
    pub fn write(&self, path: &Path) -> Result<(), ResourceError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|err| ResourceError::Io(path.display().to_string(), err.to_string()))
    }

    /// Builds the index entry for this file.
    pub fn index_entry(&self, path: &Path) -> Result<AssetIndexEntry, ResourceError> {
        let type_id = lode_core::resolve_type(&self.type_name).ok_or_else(|| {
            ResourceError::Reflect(ReflectError::TypeNotRegistered(self.type_name.clone()))
        })?;
        Ok(AssetIndexEntry {
            guid: self.guid,
            name: self.name.clone(),
            type_id,
            path: path.to_path_buf(),
        })
    }
}

/// Environment handed to the reflected asset functions; `'static`, so it can
/// travel through the uniform `&dyn Any` call site.
#[derive(Clone)]
pub struct AssetEnv {
    /// The shared object storage.
    pub storage: Arc<Storage>,
    /// The shared asset index.
    pub index: Arc<RwLock<AssetIndex>>,
}

impl RefResolver for AssetEnv {
    fn resolve_asset(&self, guid: Guid) -> Option<lode_core::MetaHandle> {
        self.storage.handle_for_guid(guid)
    }

    fn resolve_entity(&self, _guid: Guid) -> Option<EntityId> {
        // Assets never reference entities.
        None
    }
}

fn env_of(context: &dyn Any) -> Result<&AssetEnv, ReflectError> {
    context
        .downcast_ref::<AssetEnv>()
        .ok_or_else(|| ReflectError::Generic("asset function expects an AssetEnv".into()))
}

fn assure_storage_of<T: Any + Send + Sync + Clone>(
    context: &dyn Any,
) -> Result<TypeId, ReflectError> {
    let storage = context
        .downcast_ref::<Storage>()
        .ok_or_else(|| ReflectError::Generic("assure_storage expects a Storage".into()))?;
    storage
        .assure::<T>()
        .map_err(|err| ReflectError::Generic(err.to_string()))
}

fn load_asset_of<T: Any + Send + Sync + Clone + Default>(
    context: &dyn Any,
    guid: Guid,
) -> Result<(), ReflectError> {
    let env = env_of(context)?;
    let entry = env
        .index
        .read()
        .unwrap()
        .get(guid)
        .cloned()
        .ok_or_else(|| ReflectError::Generic(format!("asset {guid} is not in the index")))?;
    let file =
        AssetFile::read(&entry.path).map_err(|err| ReflectError::Generic(err.to_string()))?;

    let mut value = T::default();
    deserialize_value(&file.data, &mut value)?;
    env.storage
        .add(value, guid)
        .map_err(|err| ReflectError::Generic(err.to_string()))?;
    Ok(())
}

fn unload_asset_of<T: Any + Send + Sync + Clone>(
    context: &dyn Any,
    guid: Guid,
) -> Result<(), ReflectError> {
    let env = env_of(context)?;
    let handle = env
        .storage
        .handle_for_guid_typed::<T>(guid)
        .ok_or_else(|| ReflectError::Generic(format!("asset {guid} is not loaded")))?;
    env.storage
        .release::<T>(handle)
        .map_err(|err| ReflectError::Generic(err.to_string()))?;
    Ok(())
}

fn bind_asset_of<T: Any + Send + Sync + Clone>(
    context: &dyn Any,
    guid: Guid,
) -> Result<(), ReflectError> {
    let env = env_of(context)?;
    let Some(handle) = env.storage.handle_for_guid(guid) else {
        // Nothing loaded to bind; soft.
        return Ok(());
    };
    let desc = descriptor_by_id(handle.type_id)?;
    if let Some(TypeFn::BindAssetRefs(bind)) = desc.function(FN_BIND_ASSET_REFS) {
        env.storage
            .with_value_mut(handle, &mut |value| bind(value, env))
            .map_err(|err| ReflectError::Generic(err.to_string()))?;
    }
    Ok(())
}

fn unbind_asset_of<T: Any + Send + Sync + Clone>(
    _context: &dyn Any,
    _guid: Guid,
) -> Result<(), ReflectError> {
    // Cached handles inside the asset die with it; references held by other
    // assets stay soft and re-resolve on their next bind pass.
    Ok(())
}

/// Checks that the GUID resolves to a live slot.
pub(crate) fn validate_asset_in(env: &AssetEnv, guid: Guid) -> bool {
    env.storage
        .handle_for_guid(guid)
        .map(|handle| env.storage.is_valid(handle))
        .unwrap_or(false)
}

/// Checks the GUID and, transitively, every asset it references.
pub(crate) fn validate_asset_recursive_in(env: &AssetEnv, guid: Guid) -> bool {
    let mut visited = HashSet::new();
    let mut frontier = vec![guid];
    while let Some(current) = frontier.pop() {
        if !visited.insert(current) {
            continue;
        }
        let Some(handle) = env.storage.handle_for_guid(current) else {
            return false;
        };
        if !env.storage.is_valid(handle) {
            return false;
        }
        let Ok(desc) = descriptor_by_id(handle.type_id) else {
            return false;
        };
        if let Some(TypeFn::CollectAssetGuids(collect)) = desc.function(FN_COLLECT_ASSET_GUIDS) {
            let mut children = Vec::new();
            let _ = env
                .storage
                .with_value(handle, &mut |value| collect(value, &mut children));
            frontier.extend(children.into_iter().filter(|child| child.is_valid()));
        }
    }
    true
}

fn validate_asset_fn(context: &dyn Any, guid: Guid) -> bool {
    env_of(context)
        .map(|env| validate_asset_in(env, guid))
        .unwrap_or(false)
}

fn validate_asset_recursive_fn(context: &dyn Any, guid: Guid) -> bool {
    env_of(context)
        .map(|env| validate_asset_recursive_in(env, guid))
        .unwrap_or(false)
}

/// Installs the standard asset function set on a type under registration:
/// `assure_storage`, `load_asset`, `unload_asset`, `bind_asset`,
/// `unbind_asset`, `validate_asset` and `validate_asset_recursive`.
///
/// Type-specific functions (`collect_asset_guids`, `bind_asset_refs`) are
/// supplied by the asset author on the same builder.
pub fn install_asset_functions<T: Any + Send + Sync + Clone + Default>(
    builder: TypeBuilder<T>,
) -> TypeBuilder<T> {
    builder
        .function(
            FN_ASSURE_STORAGE,
            TypeFn::AssureStorage(assure_storage_of::<T>),
        )
        .function(FN_LOAD_ASSET, TypeFn::LoadAsset(load_asset_of::<T>))
        .function(FN_UNLOAD_ASSET, TypeFn::UnloadAsset(unload_asset_of::<T>))
        .function(FN_BIND_ASSET, TypeFn::BindAsset(bind_asset_of::<T>))
        .function(FN_UNBIND_ASSET, TypeFn::UnbindAsset(unbind_asset_of::<T>))
        .function(FN_VALIDATE_ASSET, TypeFn::ValidateAsset(validate_asset_fn))
        .function(
            FN_VALIDATE_ASSET_RECURSIVE,
            TypeFn::ValidateAssetRecursive(validate_asset_recursive_fn),
        )
}
