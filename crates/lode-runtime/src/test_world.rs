//! Reference in-memory implementation of [`EntityManager`], used by tests
//! across the workspace and by examples. Not meant for production use.

use std::collections::HashMap;

use lode_core::{EntityId, Guid, TypeId};
use lode_reflect::{descriptor_of_value, Reflect};

use crate::EntityManager;

struct EntityRecord {
    guid: Guid,
    name: String,
    parent: Option<EntityId>,
    components: HashMap<TypeId, Box<dyn Reflect>>,
}

/// Simple map-backed entity registry.
#[derive(Default)]
pub struct TestWorld {
    next_id: u64,
    entities: HashMap<EntityId, EntityRecord>,
    guid_to_entity: HashMap<Guid, EntityId>,
    /// Creation order, to keep children_of deterministic.
    order: Vec<EntityId>,
    pending_destroy: Vec<EntityId>,
}

impl TestWorld {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl EntityManager for TestWorld {
    fn create_entity(
        &mut self,
        name: &str,
        parent: Option<EntityId>,
        guid_hint: Option<Guid>,
    ) -> (Guid, EntityId) {
        let guid = guid_hint.filter(|guid| guid.is_valid()).unwrap_or_else(Guid::generate);
        let entity = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        let parent = parent.filter(|parent| self.entities.contains_key(parent));
        self.entities.insert(
            entity,
            EntityRecord {
                guid,
                name: name.to_owned(),
                parent,
                components: HashMap::new(),
            },
        );
        self.guid_to_entity.insert(guid, entity);
        self.order.push(entity);
        (guid, entity)
    }

    fn entity_from_guid(&self, guid: Guid) -> Option<EntityId> {
        self.guid_to_entity.get(&guid).copied()
    }

    fn all_entities(&self) -> Vec<(Guid, EntityId)> {
        self.guid_to_entity
            .iter()
            .map(|(guid, entity)| (*guid, *entity))
            .collect()
    }

    fn guid_of(&self, entity: EntityId) -> Option<Guid> {
        self.entities.get(&entity).map(|record| record.guid)
    }

    fn is_valid(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn name_of(&self, entity: EntityId) -> Option<String> {
        self.entities.get(&entity).map(|record| record.name.clone())
    }

    fn parent_of(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.get(&entity).and_then(|record| record.parent)
    }

    fn children_of(&self, entity: EntityId) -> Vec<EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.entities
                    .get(id)
                    .is_some_and(|record| record.parent == Some(entity))
            })
            .collect()
    }

    fn set_parent(&mut self, entity: EntityId, parent: Option<EntityId>) -> bool {
        if let Some(parent) = parent {
            if !self.entities.contains_key(&parent) || parent == entity {
                return false;
            }
        }
        match self.entities.get_mut(&entity) {
            Some(record) => {
                record.parent = parent;
                true
            }
            None => false,
        }
    }

    fn queue_destroy(&mut self, entity: EntityId) {
        if self.entities.contains_key(&entity) && !self.pending_destroy.contains(&entity) {
            self.pending_destroy.push(entity);
        }
    }

    fn destroy_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_destroy);
        let mut destroyed = 0;
        for entity in pending {
            if self.destroy_now(entity) {
                destroyed += 1;
            }
        }
        destroyed
    }

    fn destroy_now(&mut self, entity: EntityId) -> bool {
        let Some(record) = self.entities.remove(&entity) else {
            return false;
        };
        // The guid may already point at a respawned entity; only drop the
        // mapping if it is still ours.
        if self.guid_to_entity.get(&record.guid) == Some(&entity) {
            self.guid_to_entity.remove(&record.guid);
        }
        self.order.retain(|id| *id != entity);
        for other in self.entities.values_mut() {
            if other.parent == Some(entity) {
                other.parent = None;
            }
        }
        true
    }

    fn component_types(&self, entity: EntityId) -> Vec<TypeId> {
        self.entities
            .get(&entity)
            .map(|record| record.components.keys().copied().collect())
            .unwrap_or_default()
    }

    fn with_component(
        &self,
        entity: EntityId,
        type_id: TypeId,
        visitor: &mut dyn FnMut(&dyn Reflect),
    ) -> bool {
        match self
            .entities
            .get(&entity)
            .and_then(|record| record.components.get(&type_id))
        {
            Some(component) => {
                visitor(component.as_ref());
                true
            }
            None => false,
        }
    }

    fn with_component_mut(
        &mut self,
        entity: EntityId,
        type_id: TypeId,
        visitor: &mut dyn FnMut(&mut dyn Reflect),
    ) -> bool {
        match self
            .entities
            .get_mut(&entity)
            .and_then(|record| record.components.get_mut(&type_id))
        {
            Some(component) => {
                visitor(component.as_mut());
                true
            }
            None => false,
        }
    }

    fn insert_component(&mut self, entity: EntityId, component: Box<dyn Reflect>) -> bool {
        let Ok(desc) = descriptor_of_value(component.as_ref()) else {
            return false;
        };
        match self.entities.get_mut(&entity) {
            Some(record) => {
                record.components.insert(desc.type_id, component);
                true
            }
            None => false,
        }
    }

    fn remove_component(&mut self, entity: EntityId, type_id: TypeId) -> bool {
        self.entities
            .get_mut(&entity)
            .is_some_and(|record| record.components.remove(&type_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_lookup_destroy() {
        let mut world = TestWorld::new();
        let (guid, entity) = world.create_entity("root", None, None);
        assert!(world.is_valid(entity));
        assert_eq!(world.entity_from_guid(guid), Some(entity));
        assert_eq!(world.guid_of(entity), Some(guid));

        let (_, child) = world.create_entity("child", Some(entity), None);
        assert_eq!(world.children_of(entity), vec![child]);

        world.queue_destroy(entity);
        assert!(world.is_valid(entity), "destruction is deferred");
        assert_eq!(world.destroy_pending(), 1);
        assert!(!world.is_valid(entity));
        assert_eq!(world.parent_of(child), None, "children detach");
    }
}
