use std::fmt;

use serde_json::Value;

use crate::{
    descriptor_of_value, deserialize_value, serialize_value, FieldId, Purpose, Reflect,
    ReflectError, TypeKind,
};

/// One step of a [`MetaFieldPath`].
#[derive(Clone, Debug, PartialEq)]
pub enum PathEntry {
    /// Enter a data field of a struct.
    Data {
        /// Interned field id.
        id: FieldId,
        /// Field name, kept for display.
        name: String,
    },
    /// Enter a sequence element.
    Index {
        /// Element index.
        index: usize,
        /// Display name of the step.
        name: String,
    },
    /// Enter the mapped value addressed by a key.
    Key {
        /// The key, in its serialized form.
        key: Value,
        /// Display name of the step.
        name: String,
    },
}

/// Ordered steps addressing a nested field inside a reflected value.
///
/// The first entry must be `Data`; index and key entries may repeat freely
/// below it (nested containers).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetaFieldPath {
    /// The path steps, outermost first.
    pub entries: Vec<PathEntry>,
}

impl MetaFieldPath {
    /// Returns an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a data-field step.
    pub fn push_data(&mut self, name: &str) -> &mut Self {
        self.entries.push(PathEntry::Data {
            id: FieldId::from_name(name),
            name: name.to_owned(),
        });
        self
    }

    /// Appends a sequence-index step.
    pub fn push_index(&mut self, index: usize) -> &mut Self {
        self.entries.push(PathEntry::Index {
            index,
            name: index.to_string(),
        });
        self
    }

    /// Appends a map-key step.
    pub fn push_key(&mut self, key: Value, name: &str) -> &mut Self {
        self.entries.push(PathEntry::Key {
            key,
            name: name.to_owned(),
        });
        self
    }

    /// Removes the last step.
    pub fn pop(&mut self) -> &mut Self {
        self.entries.pop();
        self
    }

    /// Checks the build-time constraints of the path.
    pub fn validate(&self) -> Result<(), ReflectError> {
        if self.entries.is_empty() {
            return Err(ReflectError::InvalidPath("empty path".into()));
        }
        for (position, entry) in self.entries.iter().enumerate() {
            match entry {
                PathEntry::Data { name, .. } => {
                    if name.is_empty() {
                        return Err(ReflectError::InvalidPath("unnamed data entry".into()));
                    }
                }
                PathEntry::Index { .. } | PathEntry::Key { .. } => {
                    if position == 0 {
                        return Err(ReflectError::InvalidPath(
                            "path must start with a data field".into(),
                        ));
                    }
                }
            }
            if let PathEntry::Key { key, .. } = entry {
                if key.is_null() {
                    return Err(ReflectError::InvalidPath("null key entry".into()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for MetaFieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match entry {
                PathEntry::Data { name, .. } => write!(f, "::{name}")?,
                PathEntry::Index { index, .. } => write!(f, "[{index}]")?,
                PathEntry::Key { key, .. } => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

/// Walks a path to the addressed field, immutably.
pub fn resolve_path<'a>(
    root: &'a dyn Reflect,
    path: &MetaFieldPath,
) -> Result<&'a dyn Reflect, ReflectError> {
    let mut current = root;
    for entry in &path.entries {
        let desc = descriptor_of_value(current)?;
        current = match (entry, &desc.kind) {
            (PathEntry::Data { id, .. }, TypeKind::Struct(_)) => {
                (desc.field(*id)?.get)(current)
            }
            (PathEntry::Index { index, .. }, TypeKind::Sequence(ops)) => (ops.get)(current, *index)
                .ok_or(ReflectError::IndexOutOfBounds(*index, desc.id_string))?,
            (PathEntry::Key { .. }, TypeKind::Map(_)) => {
                return Err(ReflectError::InvalidPath(
                    "key steps require mutable traversal".into(),
                ))
            }
            _ => {
                return Err(ReflectError::InvalidPath(format!(
                    "step {entry:?} does not apply to '{}'",
                    desc.id_string
                )))
            }
        };
    }
    Ok(current)
}

/// Walks a path to the addressed field, mutably.
pub fn resolve_path_mut<'a>(
    root: &'a mut dyn Reflect,
    path: &MetaFieldPath,
) -> Result<&'a mut dyn Reflect, ReflectError> {
    let mut current = root;
    for entry in &path.entries {
        let desc = descriptor_of_value(current)?;
        current = match (entry, &desc.kind) {
            (PathEntry::Data { id, .. }, TypeKind::Struct(_)) => {
                (desc.field(*id)?.get_mut)(current)
            }
            (PathEntry::Index { index, .. }, TypeKind::Sequence(ops)) => {
                (ops.get_mut)(current, *index)
                    .ok_or(ReflectError::IndexOutOfBounds(*index, desc.id_string))?
            }
            (PathEntry::Key { key, .. }, TypeKind::Map(ops)) => (ops.get_mut_json)(current, key)?,
            _ => {
                return Err(ReflectError::InvalidPath(format!(
                    "step {entry:?} does not apply to '{}'",
                    desc.id_string
                )))
            }
        };
    }
    Ok(current)
}

/// Assigns a serialized value to the field addressed by `path`.
///
/// The leaf is deserialized into a staged clone first and committed in one
/// assignment, so a malformed value leaves the target untouched.
pub fn assign_at_path(
    root: &mut dyn Reflect,
    path: &MetaFieldPath,
    leaf: &Value,
) -> Result<(), ReflectError> {
    path.validate()?;
    let target = resolve_path_mut(root, path)?;
    let mut staged = target.clone_boxed();
    deserialize_value(leaf, staged.as_mut())?;
    if !target.assign(staged.as_ref()) {
        return Err(ReflectError::AssignMismatch(path.to_string()));
    }
    Ok(())
}

/// Serializes the field addressed by `path` under the given purpose.
pub fn value_at_path(
    root: &dyn Reflect,
    path: &MetaFieldPath,
    purpose: Purpose,
) -> Result<Value, ReflectError> {
    serialize_value(resolve_path(root, path)?, purpose)
}

/// Mutable variant of [`value_at_path`] for roots that are only reachable
/// mutably; supports key steps.
pub fn value_at_path_mut(
    root: &mut dyn Reflect,
    path: &MetaFieldPath,
    purpose: Purpose,
) -> Result<Value, ReflectError> {
    serialize_value(resolve_path_mut(root, path)?, purpose)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{register_test_types, Holder, Vec2, Vec3};

    #[test]
    fn assigns_a_top_level_field() {
        register_test_types();
        let mut value = Vec2 { x: 1.0, y: 2.0 };
        let mut path = MetaFieldPath::new();
        path.push_data("x");
        assign_at_path(&mut value, &path, &json!(9.5)).unwrap();
        assert_eq!(value, Vec2 { x: 9.5, y: 2.0 });
    }

    #[test]
    fn assigns_through_nested_structs() {
        register_test_types();
        let mut value = Vec3::default();
        let mut path = MetaFieldPath::new();
        path.push_data("xy").push_data("y");
        assign_at_path(&mut value, &path, &json!(7.0)).unwrap();
        assert_eq!(value.xy.y, 7.0);
        assert_eq!(value_at_path(&value, &path, Purpose::Generic).unwrap(), json!(7.0));
    }

    #[test]
    fn assigns_through_index_and_key_steps() {
        register_test_types();
        let mut value = Holder {
            items: vec![1, 2, 3],
            table: [(2, 20)].into_iter().collect(),
        };

        let mut path = MetaFieldPath::new();
        path.push_data("items").push_index(1);
        assign_at_path(&mut value, &path, &json!(42)).unwrap();
        assert_eq!(value.items, vec![1, 42, 3]);

        let mut path = MetaFieldPath::new();
        path.push_data("table").push_key(json!(2), "2");
        assign_at_path(&mut value, &path, &json!(99)).unwrap();
        assert_eq!(value.table[&2], 99);
    }

    #[test]
    fn first_entry_must_be_a_data_field() {
        register_test_types();
        let mut path = MetaFieldPath::new();
        path.push_index(0);
        assert!(path.validate().is_err());
    }

    #[test]
    fn out_of_bounds_index_fails_without_mutation() {
        register_test_types();
        let mut value = Holder {
            items: vec![1],
            table: Default::default(),
        };
        let mut path = MetaFieldPath::new();
        path.push_data("items").push_index(5);
        assert!(assign_at_path(&mut value, &path, &json!(0)).is_err());
        assert_eq!(value.items, vec![1]);
    }

    #[test]
    fn malformed_leaf_leaves_the_target_untouched() {
        register_test_types();
        let mut value = Vec2 { x: 1.0, y: 2.0 };
        let mut path = MetaFieldPath::new();
        path.push_data("x");
        assert!(assign_at_path(&mut value, &path, &json!("not a number")).is_err());
        assert_eq!(value, Vec2 { x: 1.0, y: 2.0 });
    }

    #[test]
    fn display_form_matches_the_builder_chain() {
        let mut path = MetaFieldPath::new();
        path.push_data("items").push_index(3).push_key(json!(2), "2");
        assert_eq!(path.to_string(), "::items[3][2]");
    }
}
