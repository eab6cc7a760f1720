//! Reflection helpers that bridge entities and their components to the asset
//! layer: GUID collection, reference binding, serialization and spawning.

use std::collections::HashMap;

use lode_core::{EntityId, Guid, MetaHandle};
use lode_reflect::{
    descriptor_by_id, descriptor_by_name, deserialize_value_in, serialize_value, DeserializeCtx,
    Purpose, RefResolver, TypeFn, FN_BIND_ASSET_REFS, FN_BIND_ENTITY_REFS, FN_COLLECT_ASSET_GUIDS,
};
use lode_runtime::{EntityManager, ResourceManager};
use lode_storage::EntityRef;
use serde_json::{json, Map, Value};

use crate::BatchError;

/// Resolver over the loaded assets and a snapshot of the entity GUID map,
/// used while mutably walking components.
pub struct SnapshotResolver<'a> {
    resources: &'a ResourceManager,
    entities: HashMap<Guid, EntityId>,
}

impl<'a> SnapshotResolver<'a> {
    /// Snapshots the entity GUID map of `entities`.
    pub fn new(resources: &'a ResourceManager, entities: &dyn EntityManager) -> Self {
        Self {
            resources,
            entities: entities.all_entities().into_iter().collect(),
        }
    }
}

impl RefResolver for SnapshotResolver<'_> {
    fn resolve_asset(&self, guid: Guid) -> Option<MetaHandle> {
        self.resources.resolve_asset(guid)
    }

    fn resolve_entity(&self, guid: Guid) -> Option<EntityId> {
        self.entities.get(&guid).copied()
    }
}

/// Direct asset GUIDs referenced by the entity's components, sorted and
/// deduplicated. Invalid GUIDs are dropped.
pub fn collect_asset_guids_for_entity(
    entities: &dyn EntityManager,
    entity: EntityId,
) -> Vec<Guid> {
    let mut guids = Vec::new();
    for type_id in entities.component_types(entity) {
        let Ok(desc) = descriptor_by_id(type_id) else {
            continue;
        };
        if let Some(TypeFn::CollectAssetGuids(collect)) = desc.function(FN_COLLECT_ASSET_GUIDS) {
            entities.with_component(entity, type_id, &mut |value| collect(value, &mut guids));
        }
    }
    guids.retain(|guid| guid.is_valid());
    guids.sort();
    guids.dedup();
    guids
}

/// Re-resolves asset and entity references inside all of the entity's
/// components. Main-thread only; misses are soft.
pub fn bind_refs_for_entity(
    entities: &mut dyn EntityManager,
    entity: EntityId,
    resources: &ResourceManager,
) {
    let resolver = SnapshotResolver::new(resources, entities);
    for type_id in entities.component_types(entity) {
        let Ok(desc) = descriptor_by_id(type_id) else {
            continue;
        };
        entities.with_component_mut(entity, type_id, &mut |value| {
            if let Some(TypeFn::BindAssetRefs(bind)) = desc.function(FN_BIND_ASSET_REFS) {
                bind(value, &resolver);
            }
            if let Some(TypeFn::BindEntityRefs(bind)) = desc.function(FN_BIND_ENTITY_REFS) {
                bind(value, &resolver);
            }
        });
    }
}

/// Serializes a live entity into its descriptor:
/// `{ "entity_guid": <u64>, "components": { "<type-id-string>": ... } }`.
pub fn serialize_entity(
    entities: &dyn EntityManager,
    entity_ref: EntityRef,
    purpose: Purpose,
) -> Result<Value, BatchError> {
    let mut components = Map::new();
    for type_id in entities.component_types(entity_ref.entity) {
        let desc = descriptor_by_id(type_id)?;
        let mut serialized = None;
        entities.with_component(entity_ref.entity, type_id, &mut |value| {
            serialized = Some(serialize_value(value, purpose));
        });
        if let Some(serialized) = serialized {
            components.insert(desc.id_string.to_owned(), serialized?);
        }
    }
    Ok(json!({
        "entity_guid": entity_ref.guid.as_raw(),
        "components": Value::Object(components),
    }))
}

/// Spawns an entity from a descriptor produced by [`serialize_entity`].
///
/// Unknown component types are skipped with a warning, for forward
/// compatibility with newer files.
pub fn spawn_entity_from_desc(
    entities: &mut dyn EntityManager,
    descriptor: &Value,
) -> Result<EntityRef, BatchError> {
    let guid = descriptor
        .get("entity_guid")
        .and_then(Value::as_u64)
        .map(Guid::from_raw)
        .filter(|guid| guid.is_valid())
        .ok_or_else(|| {
            BatchError::MalformedBatchFile("entity descriptor without entity_guid".into())
        })?;

    let (guid, entity) = entities.create_entity("", None, Some(guid));

    if let Some(components) = descriptor.get("components").and_then(Value::as_object) {
        for (type_name, component_json) in components {
            let desc = match descriptor_by_name(type_name) {
                Ok(desc) => desc,
                Err(_err) => {
                    tracing::warn!("skipping unknown component type '{type_name}'");
                    continue;
                }
            };
            let mut component = (desc.make_default)();
            let mut ctx = DeserializeCtx {
                entity,
                user: None,
            };
            deserialize_value_in(component_json, component.as_mut(), &mut ctx)?;
            entities.insert_component(entity, component);
        }
    }

    Ok(EntityRef::bound(guid, entity))
}
