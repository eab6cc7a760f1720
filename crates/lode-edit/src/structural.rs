//! Structural entity commands: create, destroy, copy, reparent and
//! component add/remove. Each captures enough serialized state to redo and
//! undo, and notifies the batch registry so closures can be recomputed.

use lode_batch::{bind_refs_for_entity, serialize_entity, spawn_entity_from_desc};
use lode_core::{EntityId, Guid, TypeId};
use lode_reflect::{descriptor_by_id, deserialize_value, serialize_value, Purpose};
use lode_runtime::BatchId;
use lode_storage::EntityRef;
use serde_json::Value;

use crate::{Command, CommandStatus, EditContext};

fn entity_of(ctx: &EditContext<'_>, guid: Guid) -> Option<EntityId> {
    ctx.entities.entity_from_guid(guid)
}

/// Creates an empty entity inside a batch.
pub struct CreateEntityCommand {
    batch: BatchId,
    name: String,
    parent_guid: Option<Guid>,
    /// Assigned on first execute so redo recreates the same identity.
    created_guid: Option<Guid>,
}

impl CreateEntityCommand {
    /// Builds the command.
    pub fn new(batch: BatchId, name: impl Into<String>, parent_guid: Option<Guid>) -> Self {
        Self {
            batch,
            name: name.into(),
            parent_guid,
            created_guid: None,
        }
    }

    /// GUID of the created entity, once executed.
    pub fn created_guid(&self) -> Option<Guid> {
        self.created_guid
    }
}

impl Command for CreateEntityCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let parent = self.parent_guid.and_then(|guid| entity_of(ctx, guid));
        let (guid, entity) = ctx
            .entities
            .create_entity(&self.name, parent, self.created_guid);
        self.created_guid = Some(guid);
        ctx.batches
            .attach_live(self.batch, EntityRef::bound(guid, entity));
        CommandStatus::Done
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(guid) = self.created_guid else {
            return CommandStatus::Failed;
        };
        let Some(entity) = entity_of(ctx, guid) else {
            return CommandStatus::Failed;
        };
        ctx.batches.detach_live(self.batch, guid);
        if ctx.entities.destroy_now(entity) {
            CommandStatus::Done
        } else {
            CommandStatus::Failed
        }
    }

    fn name(&self) -> String {
        format!("Create entity '{}'", self.name)
    }
}

/// Serialized capture of one destroyed entity.
struct EntitySnapshot {
    descriptor: Value,
    parent_guid: Option<Guid>,
    was_live: bool,
}

fn snapshot_entity(
    ctx: &EditContext<'_>,
    batch: BatchId,
    guid: Guid,
    entity: EntityId,
) -> Result<EntitySnapshot, String> {
    let descriptor = serialize_entity(
        ctx.entities,
        EntityRef::bound(guid, entity),
        Purpose::Undo,
    )
    .map_err(|err| err.to_string())?;
    let parent_guid = ctx
        .entities
        .parent_of(entity)
        .and_then(|parent| ctx.entities.guid_of(parent));
    let was_live = ctx
        .batches
        .batch(batch)
        .map(|info| info.live.iter().any(|live| live.guid == guid))
        .unwrap_or(false);
    Ok(EntitySnapshot {
        descriptor,
        parent_guid,
        was_live,
    })
}

fn restore_snapshot(
    ctx: &mut EditContext<'_>,
    batch: BatchId,
    snapshot: &EntitySnapshot,
) -> Result<EntityRef, String> {
    let restored =
        spawn_entity_from_desc(ctx.entities, &snapshot.descriptor).map_err(|err| err.to_string())?;
    if let Some(parent_guid) = snapshot.parent_guid {
        if let Some(parent) = entity_of(ctx, parent_guid) {
            ctx.entities.set_parent(restored.entity, Some(parent));
        }
    }
    bind_refs_for_entity(ctx.entities, restored.entity, ctx.resources);
    if snapshot.was_live {
        ctx.batches.attach_live(batch, restored);
    }
    Ok(restored)
}

/// Destroys one entity, capturing an undo snapshot of its components.
pub struct DestroyEntityCommand {
    batch: BatchId,
    entity_guid: Guid,
    snapshot: Option<EntitySnapshot>,
}

impl DestroyEntityCommand {
    /// Builds the command.
    pub fn new(batch: BatchId, entity_guid: Guid) -> Self {
        Self {
            batch,
            entity_guid,
            snapshot: None,
        }
    }
}

impl Command for DestroyEntityCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        match snapshot_entity(ctx, self.batch, self.entity_guid, entity) {
            Ok(snapshot) => self.snapshot = Some(snapshot),
            Err(message) => {
                tracing::warn!("destroy snapshot failed: {message}");
                return CommandStatus::Failed;
            }
        }
        // Mark while the entity is still in the live set.
        ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
        ctx.batches.detach_live(self.batch, self.entity_guid);
        if ctx.entities.destroy_now(entity) {
            CommandStatus::Done
        } else {
            CommandStatus::Failed
        }
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return CommandStatus::Failed;
        };
        match restore_snapshot(ctx, self.batch, snapshot) {
            Ok(_restored) => {
                ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
                CommandStatus::Done
            }
            Err(message) => {
                tracing::warn!("destroy undo failed: {message}");
                CommandStatus::Failed
            }
        }
    }

    fn name(&self) -> String {
        format!("Destroy entity {}", self.entity_guid)
    }
}

/// Destroys an entity and all of its descendants.
pub struct DestroyEntityBranchCommand {
    batch: BatchId,
    root_guid: Guid,
    /// Snapshots in top-down order, so undo can respawn parents first.
    snapshots: Vec<EntitySnapshot>,
}

impl DestroyEntityBranchCommand {
    /// Builds the command.
    pub fn new(batch: BatchId, root_guid: Guid) -> Self {
        Self {
            batch,
            root_guid,
            snapshots: Vec::new(),
        }
    }
}

fn branch_entities(ctx: &EditContext<'_>, root: EntityId) -> Vec<EntityId> {
    let mut ordered = vec![root];
    let mut cursor = 0;
    while cursor < ordered.len() {
        let current = ordered[cursor];
        ordered.extend(ctx.entities.children_of(current));
        cursor += 1;
    }
    ordered
}

impl Command for DestroyEntityBranchCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(root) = entity_of(ctx, self.root_guid) else {
            return CommandStatus::Failed;
        };
        let branch = branch_entities(ctx, root);

        let mut snapshots = Vec::with_capacity(branch.len());
        for &entity in &branch {
            let Some(guid) = ctx.entities.guid_of(entity) else {
                return CommandStatus::Failed;
            };
            match snapshot_entity(ctx, self.batch, guid, entity) {
                Ok(snapshot) => snapshots.push((guid, snapshot)),
                Err(message) => {
                    tracing::warn!("branch snapshot failed: {message}");
                    return CommandStatus::Failed;
                }
            }
        }

        ctx.batches.mark_closure_dirty_for_entity(self.root_guid);
        for (guid, _snapshot) in &snapshots {
            ctx.batches.detach_live(self.batch, *guid);
        }
        // Destroy leaves first.
        for &entity in branch.iter().rev() {
            ctx.entities.destroy_now(entity);
        }
        self.snapshots = snapshots.into_iter().map(|(_guid, snapshot)| snapshot).collect();
        CommandStatus::Done
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        if self.snapshots.is_empty() {
            return CommandStatus::Failed;
        }
        for snapshot in &self.snapshots {
            if let Err(message) = restore_snapshot(ctx, self.batch, snapshot) {
                tracing::warn!("branch undo failed: {message}");
                return CommandStatus::Failed;
            }
        }
        ctx.batches.mark_closure_dirty_for_entity(self.root_guid);
        CommandStatus::Done
    }

    fn name(&self) -> String {
        format!("Destroy branch {}", self.root_guid)
    }
}

/// Clones an entity branch under the same parent, with fresh GUIDs.
///
/// References inside the copied components keep pointing at their original
/// targets.
pub struct CopyEntityBranchCommand {
    batch: BatchId,
    source_guid: Guid,
    /// Remapped descriptors in top-down order; filled on first execute so
    /// redo recreates identical GUIDs.
    copies: Vec<EntitySnapshot>,
    created_guids: Vec<Guid>,
}

impl CopyEntityBranchCommand {
    /// Builds the command.
    pub fn new(batch: BatchId, source_guid: Guid) -> Self {
        Self {
            batch,
            source_guid,
            copies: Vec::new(),
            created_guids: Vec::new(),
        }
    }

    /// GUID of the copied root, once executed.
    pub fn copied_root(&self) -> Option<Guid> {
        self.created_guids.first().copied()
    }

    fn prepare_copies(&mut self, ctx: &EditContext<'_>, root: EntityId) -> Result<(), String> {
        let branch = branch_entities(ctx, root);
        let mut guid_map = std::collections::HashMap::new();
        let mut snapshots = Vec::with_capacity(branch.len());

        for &entity in &branch {
            let guid = ctx
                .entities
                .guid_of(entity)
                .ok_or_else(|| "entity without guid".to_owned())?;
            let fresh = Guid::generate();
            guid_map.insert(guid, fresh);
            let mut snapshot = snapshot_entity(ctx, self.batch, guid, entity)?;
            snapshot.descriptor["entity_guid"] = Value::from(fresh.as_raw());
            // Parents inside the branch remap to their copies; the root
            // keeps the original parent.
            snapshot.parent_guid = snapshot
                .parent_guid
                .map(|parent| guid_map.get(&parent).copied().unwrap_or(parent));
            snapshot.was_live = true;
            snapshots.push(snapshot);
            self.created_guids.push(fresh);
        }
        self.copies = snapshots;
        Ok(())
    }
}

impl Command for CopyEntityBranchCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        if self.copies.is_empty() {
            let Some(root) = entity_of(ctx, self.source_guid) else {
                return CommandStatus::Failed;
            };
            if let Err(message) = self.prepare_copies(ctx, root) {
                tracing::warn!("branch copy failed: {message}");
                return CommandStatus::Failed;
            }
        }
        for snapshot in &self.copies {
            if let Err(message) = restore_snapshot(ctx, self.batch, snapshot) {
                tracing::warn!("branch copy failed: {message}");
                return CommandStatus::Failed;
            }
        }
        ctx.batches.mark_closure_dirty_for_entity(self.source_guid);
        CommandStatus::Done
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        for &guid in self.created_guids.iter().rev() {
            ctx.batches.detach_live(self.batch, guid);
            if let Some(entity) = entity_of(ctx, guid) {
                ctx.entities.destroy_now(entity);
            }
        }
        CommandStatus::Done
    }

    fn name(&self) -> String {
        format!("Copy branch {}", self.source_guid)
    }
}

/// Moves an entity (and implicitly its branch) under a new parent.
pub struct ReparentEntityBranchCommand {
    entity_guid: Guid,
    new_parent: Option<Guid>,
    prev_parent: Option<Guid>,
}

impl ReparentEntityBranchCommand {
    /// Builds the command; `None` detaches to the root.
    pub fn new(entity_guid: Guid, new_parent: Option<Guid>) -> Self {
        Self {
            entity_guid,
            new_parent,
            prev_parent: None,
        }
    }

    fn apply(&self, ctx: &mut EditContext<'_>, parent_guid: Option<Guid>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        let parent = match parent_guid {
            Some(guid) => match entity_of(ctx, guid) {
                Some(parent) => Some(parent),
                None => return CommandStatus::Failed,
            },
            None => None,
        };
        if ctx.entities.set_parent(entity, parent) {
            ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
            CommandStatus::Done
        } else {
            CommandStatus::Failed
        }
    }
}

impl Command for ReparentEntityBranchCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        self.prev_parent = ctx
            .entities
            .parent_of(entity)
            .and_then(|parent| ctx.entities.guid_of(parent));
        self.apply(ctx, self.new_parent)
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        self.apply(ctx, self.prev_parent)
    }

    fn name(&self) -> String {
        format!("Reparent {}", self.entity_guid)
    }
}

/// Attaches a component to an entity.
pub struct AddComponentToEntityCommand {
    entity_guid: Guid,
    component_type: TypeId,
    /// Optional initial state, deserialized over the default instance.
    init: Option<Value>,
}

impl AddComponentToEntityCommand {
    /// Builds the command.
    pub fn new(entity_guid: Guid, component_type: TypeId, init: Option<Value>) -> Self {
        Self {
            entity_guid,
            component_type,
            init,
        }
    }
}

impl Command for AddComponentToEntityCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        let Ok(desc) = descriptor_by_id(self.component_type) else {
            return CommandStatus::Failed;
        };
        let mut component = (desc.make_default)();
        if let Some(init) = &self.init {
            if deserialize_value(init, component.as_mut()).is_err() {
                return CommandStatus::Failed;
            }
        }
        if !ctx.entities.insert_component(entity, component) {
            return CommandStatus::Failed;
        }
        bind_refs_for_entity(ctx.entities, entity, ctx.resources);
        ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
        CommandStatus::Done
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        if ctx.entities.remove_component(entity, self.component_type) {
            ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
            CommandStatus::Done
        } else {
            CommandStatus::Failed
        }
    }

    fn name(&self) -> String {
        let type_name = descriptor_by_id(self.component_type)
            .map(|desc| desc.display_name)
            .unwrap_or("component");
        format!("Add {type_name}")
    }
}

/// Detaches a component, capturing its state for undo.
pub struct RemoveComponentFromEntityCommand {
    entity_guid: Guid,
    component_type: TypeId,
    snapshot: Option<Value>,
}

impl RemoveComponentFromEntityCommand {
    /// Builds the command.
    pub fn new(entity_guid: Guid, component_type: TypeId) -> Self {
        Self {
            entity_guid,
            component_type,
            snapshot: None,
        }
    }
}

impl Command for RemoveComponentFromEntityCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        let mut snapshot = None;
        ctx.entities
            .with_component(entity, self.component_type, &mut |component| {
                snapshot = Some(serialize_value(component, Purpose::Undo));
            });
        match snapshot {
            Some(Ok(snapshot)) => self.snapshot = Some(snapshot),
            _ => return CommandStatus::Failed,
        }
        if ctx.entities.remove_component(entity, self.component_type) {
            ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
            CommandStatus::Done
        } else {
            CommandStatus::Failed
        }
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        let Some(entity) = entity_of(ctx, self.entity_guid) else {
            return CommandStatus::Failed;
        };
        let Some(snapshot) = &self.snapshot else {
            return CommandStatus::Failed;
        };
        let Ok(desc) = descriptor_by_id(self.component_type) else {
            return CommandStatus::Failed;
        };
        let mut component = (desc.make_default)();
        if deserialize_value(snapshot, component.as_mut()).is_err() {
            return CommandStatus::Failed;
        }
        if !ctx.entities.insert_component(entity, component) {
            return CommandStatus::Failed;
        }
        bind_refs_for_entity(ctx.entities, entity, ctx.resources);
        ctx.batches.mark_closure_dirty_for_entity(self.entity_guid);
        CommandStatus::Done
    }

    fn name(&self) -> String {
        let type_name = descriptor_by_id(self.component_type)
            .map(|desc| desc.display_name)
            .unwrap_or("component");
        format!("Remove {type_name}")
    }
}
