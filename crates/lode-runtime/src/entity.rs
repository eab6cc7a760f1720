use lode_core::{EntityId, Guid, TypeId};
use lode_reflect::Reflect;

/// Interface of the external entity registry.
///
/// The registry is not thread-safe; every call goes through the main thread
/// (the batch registry bridges with its main-thread queue). Components are
/// reached through reflection only.
pub trait EntityManager: Send {
    /// Creates an entity, optionally under a parent and with a caller-chosen
    /// GUID (used by undo/redo to recreate entities stably).
    fn create_entity(
        &mut self,
        name: &str,
        parent: Option<EntityId>,
        guid_hint: Option<Guid>,
    ) -> (Guid, EntityId);

    /// Resolves an entity GUID.
    fn entity_from_guid(&self, guid: Guid) -> Option<EntityId>;

    /// Snapshot of the full GUID → entity map, for resolver snapshots and
    /// whole-registry walks.
    fn all_entities(&self) -> Vec<(Guid, EntityId)>;

    /// GUID of a live entity.
    fn guid_of(&self, entity: EntityId) -> Option<Guid>;

    /// Returns `true` for live entities.
    fn is_valid(&self, entity: EntityId) -> bool;

    /// Display name of the entity.
    fn name_of(&self, entity: EntityId) -> Option<String>;

    /// Parent link, if any.
    fn parent_of(&self, entity: EntityId) -> Option<EntityId>;

    /// Direct children, in attach order.
    fn children_of(&self, entity: EntityId) -> Vec<EntityId>;

    /// Re-parents an entity; `None` detaches it to the root.
    fn set_parent(&mut self, entity: EntityId, parent: Option<EntityId>) -> bool;

    /// Marks an entity for destruction at the end of the frame.
    fn queue_destroy(&mut self, entity: EntityId);

    /// Destroys everything queued; returns the count.
    fn destroy_pending(&mut self) -> usize;

    /// Destroys an entity immediately. Children are detached, not destroyed.
    fn destroy_now(&mut self, entity: EntityId) -> bool;

    /// Types of the components attached to the entity.
    fn component_types(&self, entity: EntityId) -> Vec<TypeId>;

    /// Visits one component immutably. Returns `false` when absent.
    fn with_component(
        &self,
        entity: EntityId,
        type_id: TypeId,
        visitor: &mut dyn FnMut(&dyn Reflect),
    ) -> bool;

    /// Visits one component mutably. Returns `false` when absent.
    fn with_component_mut(
        &mut self,
        entity: EntityId,
        type_id: TypeId,
        visitor: &mut dyn FnMut(&mut dyn Reflect),
    ) -> bool;

    /// Attaches a component; its dynamic type selects the slot.
    fn insert_component(&mut self, entity: EntityId, component: Box<dyn Reflect>) -> bool;

    /// Detaches a component.
    fn remove_component(&mut self, entity: EntityId, type_id: TypeId) -> bool;
}
