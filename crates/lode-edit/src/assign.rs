use lode_batch::collect_asset_guids_for_entity;
use lode_core::{Guid, TypeId};
use lode_reflect::{
    assign_at_path, descriptor_by_id, MetaFieldPath, TypeFn, FN_POST_ASSIGN,
};
use serde_json::Value;

use crate::{Command, CommandStatus, EditContext, EditError, FieldChangedEvent};

/// What a field edit addresses: a component on an entity, or an asset in
/// storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldTarget {
    /// A component, found through the entity's GUID.
    Component {
        /// Owning entity.
        entity_guid: Guid,
        /// Component type.
        component_id: TypeId,
    },
    /// An asset, found through its GUID in storage.
    Asset {
        /// Asset identity.
        asset_guid: Guid,
        /// Expected asset type.
        asset_type: TypeId,
    },
}

/// Undoable assignment of one field, addressed by a [`MetaFieldPath`].
///
/// Both values are carried in serialized form; execute applies the new
/// value, undo the previous one. A failed resolution leaves the target
/// untouched.
pub struct AssignFieldCommand {
    target: FieldTarget,
    path: MetaFieldPath,
    prev_value: Value,
    new_value: Value,
    display_name: String,
}

impl AssignFieldCommand {
    /// Starts a builder.
    pub fn builder() -> AssignFieldCommandBuilder {
        AssignFieldCommandBuilder::default()
    }

    fn apply(&self, ctx: &mut EditContext<'_>, value: &Value, is_undo: bool) -> CommandStatus {
        match &self.target {
            FieldTarget::Component {
                entity_guid,
                component_id,
            } => {
                let Some(entity) = ctx.entities.entity_from_guid(*entity_guid) else {
                    return CommandStatus::Failed;
                };
                let guids_before = collect_asset_guids_for_entity(ctx.entities, entity);

                let mut assigned = false;
                ctx.entities
                    .with_component_mut(entity, *component_id, &mut |component| {
                        assigned = assign_at_path(component, &self.path, value).is_ok();
                    });
                if !assigned {
                    return CommandStatus::Failed;
                }

                // Post-assign hook of the component type, when registered.
                if let Ok(desc) = descriptor_by_id(*component_id) {
                    if let Some(TypeFn::PostAssign(post_assign)) = desc.function(FN_POST_ASSIGN) {
                        ctx.entities
                            .with_component_mut(entity, *component_id, &mut |component| {
                                post_assign(component, &self.path, is_undo);
                            });
                    }
                }

                ctx.events.enqueue_event(FieldChangedEvent {
                    target: self.target.clone(),
                    path: self.path.clone(),
                    is_undo,
                });

                // A component edit may change the entity's referenced asset
                // set, which dirties the owning batch's closure.
                let guids_after = collect_asset_guids_for_entity(ctx.entities, entity);
                if guids_before != guids_after {
                    ctx.batches.mark_closure_dirty_for_entity(*entity_guid);
                }

                CommandStatus::Done
            }
            FieldTarget::Asset {
                asset_guid,
                asset_type,
            } => {
                let Some(handle) = ctx.resources.handle_for_guid(*asset_guid) else {
                    return CommandStatus::Failed;
                };
                if handle.type_id != *asset_type {
                    return CommandStatus::Failed;
                }

                let mut assigned = false;
                let applied = ctx
                    .resources
                    .storage()
                    .with_value_mut(handle, &mut |asset| {
                        assigned = assign_at_path(asset, &self.path, value).is_ok();
                    });
                if applied.is_err() || !assigned {
                    return CommandStatus::Failed;
                }

                ctx.events.enqueue_event(FieldChangedEvent {
                    target: self.target.clone(),
                    path: self.path.clone(),
                    is_undo,
                });
                CommandStatus::Done
            }
        }
    }
}

impl Command for AssignFieldCommand {
    fn execute(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        self.apply(ctx, &self.new_value.clone(), false)
    }

    fn undo(&mut self, ctx: &mut EditContext<'_>) -> CommandStatus {
        self.apply(ctx, &self.prev_value.clone(), true)
    }

    fn name(&self) -> String {
        self.display_name.clone()
    }
}

/// Step-by-step construction of an [`AssignFieldCommand`], validated at
/// build time.
#[derive(Default)]
pub struct AssignFieldCommandBuilder {
    target: Option<FieldTarget>,
    path: MetaFieldPath,
    prev_value: Option<Value>,
    new_value: Option<Value>,
}

impl AssignFieldCommandBuilder {
    /// Targets a component on an entity.
    pub fn target_component(mut self, entity_guid: Guid, component_id: TypeId) -> Self {
        self.target = Some(FieldTarget::Component {
            entity_guid,
            component_id,
        });
        self
    }

    /// Targets an asset in storage.
    pub fn target_asset(mut self, asset_guid: Guid, asset_type: TypeId) -> Self {
        self.target = Some(FieldTarget::Asset {
            asset_guid,
            asset_type,
        });
        self
    }

    /// Appends a data-field step.
    pub fn push_path_data(mut self, name: &str) -> Self {
        self.path.push_data(name);
        self
    }

    /// Appends a sequence-index step.
    pub fn push_path_index(mut self, index: usize) -> Self {
        self.path.push_index(index);
        self
    }

    /// Appends a map-key step.
    pub fn push_path_key(mut self, key: Value, name: &str) -> Self {
        self.path.push_key(key, name);
        self
    }

    /// Removes the last step.
    pub fn pop_path(mut self) -> Self {
        self.path.pop();
        self
    }

    /// Value the field holds before the edit.
    pub fn prev_value(mut self, value: Value) -> Self {
        self.prev_value = Some(value);
        self
    }

    /// Value the edit assigns.
    pub fn new_value(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Validates and builds the command.
    pub fn build(self) -> Result<AssignFieldCommand, EditError> {
        let target = self.target.ok_or(EditError::MissingTarget)?;
        let prev_value = self.prev_value.ok_or(EditError::MissingValue("previous"))?;
        let new_value = self.new_value.ok_or(EditError::MissingValue("new"))?;
        self.path.validate()?;

        let type_id = match &target {
            FieldTarget::Component { component_id, .. } => *component_id,
            FieldTarget::Asset { asset_type, .. } => *asset_type,
        };
        let type_name = descriptor_by_id(type_id)
            .map(|desc| desc.display_name.to_owned())
            .unwrap_or_default();
        let display_name = format!("{type_name}{} = {new_value}", self.path);

        Ok(AssignFieldCommand {
            target,
            path: self.path,
            prev_value,
            new_value,
            display_name,
        })
    }
}
