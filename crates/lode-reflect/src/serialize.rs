use serde_json::{Map, Value};

use crate::{
    descriptor_of_value, DeserializeCtx, MetaFlags, Reflect, ReflectError, TypeFn, TypeKind,
    FN_CLONE, FN_DESERIALIZE, FN_INSPECT, FN_SERIALIZE,
};

/// Intent of a serialization pass. Selects which fields are emitted and is
/// forwarded to purpose-aware custom serializers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Purpose {
    /// No filtering beyond `NO_SERIALIZE`.
    Generic,
    /// Persist to disk.
    File,
    /// Capture state for undo.
    Undo,
    /// Present in inspection UIs.
    Display,
}

impl Purpose {
    fn exclusion(self) -> MetaFlags {
        match self {
            Self::Generic => MetaFlags::NONE,
            Self::File => MetaFlags::NO_SERIALIZE_FILE,
            Self::Undo => MetaFlags::NO_SERIALIZE_UNDO,
            Self::Display => MetaFlags::NO_SERIALIZE_DISPLAY,
        }
    }

    /// Returns whether a field with `flags` is emitted under this purpose.
    pub fn admits(self, flags: MetaFlags) -> bool {
        !flags.intersects(MetaFlags::NO_SERIALIZE | self.exclusion())
    }
}

/// Serializes a reflected value into a JSON tree under the given purpose.
pub fn serialize_value(value: &dyn Reflect, purpose: Purpose) -> Result<Value, ReflectError> {
    let desc = descriptor_of_value(value)?;

    // A registered custom serializer wins; the purpose-aware signature is
    // preferred, the legacy one accepted.
    if let Some(function) = desc.function(FN_SERIALIZE) {
        match function {
            TypeFn::Serialize(serialize) => return serialize(value, purpose),
            TypeFn::SerializeLegacy(serialize) => return serialize(value),
            _ => {}
        }
    }

    match &desc.kind {
        TypeKind::Enum(layout) => {
            let raw = (layout.read)(value);
            layout
                .entry_by_value(raw)
                .map(|entry| Value::String(entry.name.to_owned()))
                .ok_or(ReflectError::EnumValueNotNamed(desc.id_string, raw))
        }
        TypeKind::Struct(layout) => {
            let mut object = Map::new();
            for field in &layout.fields {
                if !purpose.admits(field.flags) {
                    continue;
                }
                let serialized = serialize_value((field.get)(value), purpose)
                    .map_err(|err| err.in_field(format!("{}.{}", desc.id_string, field.name)))?;
                object.insert(field.display_name.to_owned(), serialized);
            }
            Ok(Value::Object(object))
        }
        TypeKind::Sequence(ops) => {
            let len = (ops.len)(value);
            let mut array = Vec::with_capacity(len);
            for index in 0..len {
                let element = (ops.get)(value, index)
                    .ok_or(ReflectError::IndexOutOfBounds(index, desc.id_string))?;
                array.push(serialize_value(element, purpose)?);
            }
            Ok(Value::Array(array))
        }
        TypeKind::Map(ops) => {
            // Mapped containers become [[key, value], ...], sets [key, ...].
            let mut array = Vec::with_capacity((ops.len)(value));
            let mut first_error = None;
            (ops.visit)(value, &mut |key, mapped| {
                if first_error.is_some() {
                    return;
                }
                let entry = (|| -> Result<Value, ReflectError> {
                    match mapped {
                        Some(mapped) => Ok(Value::Array(vec![
                            serialize_value(key, purpose)?,
                            serialize_value(mapped, purpose)?,
                        ])),
                        None => serialize_value(key, purpose),
                    }
                })();
                match entry {
                    Ok(entry) => array.push(entry),
                    Err(err) => first_error = Some(err),
                }
            });
            match first_error {
                Some(err) => Err(err),
                None => Ok(Value::Array(array)),
            }
        }
        TypeKind::Primitive(ops) => (ops.to_json)(value),
    }
}

/// Deserializes a JSON tree into a reflected value in place.
pub fn deserialize_value(json: &Value, value: &mut dyn Reflect) -> Result<(), ReflectError> {
    deserialize_value_in(json, value, &mut DeserializeCtx::default())
}

/// Like [`deserialize_value`] but forwards a caller context to custom
/// deserializers that declared the context-taking signature.
pub fn deserialize_value_in(
    json: &Value,
    value: &mut dyn Reflect,
    ctx: &mut DeserializeCtx<'_>,
) -> Result<(), ReflectError> {
    let desc = descriptor_of_value(value)?;

    if let Some(function) = desc.function(FN_DESERIALIZE) {
        match function {
            TypeFn::Deserialize(deserialize) => return deserialize(json, value),
            TypeFn::DeserializeInContext(deserialize) => return deserialize(json, value, ctx),
            _ => {}
        }
    }

    match &desc.kind {
        TypeKind::Enum(layout) => {
            let name = json
                .as_str()
                .ok_or(ReflectError::UnexpectedJson("string", desc.id_string))?;
            let entry = layout
                .entry_by_name(name)
                .ok_or_else(|| ReflectError::EnumEntryNotFound(name.into(), desc.id_string))?;
            (layout.write)(value, entry.value)
        }
        TypeKind::Struct(layout) => {
            let object = json
                .as_object()
                .ok_or(ReflectError::UnexpectedJson("object", desc.id_string))?;
            // Missing keys are skipped for forward compatibility.
            for field in &layout.fields {
                if let Some(field_json) = object.get(field.display_name) {
                    deserialize_value_in(field_json, (field.get_mut)(value), ctx)
                        .map_err(|err| err.in_field(format!("{}.{}", desc.id_string, field.name)))?;
                }
            }
            Ok(())
        }
        TypeKind::Sequence(ops) => {
            let array = json
                .as_array()
                .ok_or(ReflectError::UnexpectedJson("array", desc.id_string))?;
            (ops.resize)(value, array.len())?;
            for (index, element_json) in array.iter().enumerate() {
                let element = (ops.get_mut)(value, index)
                    .ok_or(ReflectError::IndexOutOfBounds(index, desc.id_string))?;
                deserialize_value_in(element_json, element, ctx)?;
            }
            Ok(())
        }
        TypeKind::Map(ops) => {
            let array = json
                .as_array()
                .ok_or(ReflectError::UnexpectedJson("array", desc.id_string))?;
            (ops.clear)(value);
            for entry_json in array {
                if ops.is_set {
                    (ops.insert_json)(value, entry_json, None)?;
                } else {
                    let pair = entry_json
                        .as_array()
                        .filter(|pair| pair.len() == 2)
                        .ok_or(ReflectError::UnexpectedJson(
                            "[key, value] pair",
                            desc.id_string,
                        ))?;
                    (ops.insert_json)(value, &pair[0], Some(&pair[1]))?;
                }
            }
            Ok(())
        }
        TypeKind::Primitive(ops) => (ops.from_json)(value, json),
    }
}

/// Produces the inspection tree of a value: the registered `inspect` function
/// when present, the display-purpose serialization otherwise.
pub fn inspect_value(value: &dyn Reflect) -> Result<Value, ReflectError> {
    let desc = descriptor_of_value(value)?;
    if let Some(TypeFn::Inspect(inspect)) = desc.function(FN_INSPECT) {
        return inspect(value);
    }
    serialize_value(value, Purpose::Display)
}

/// Clones a value through its registered `clone` function, falling back to
/// the intrinsic clone.
pub fn clone_value(value: &dyn Reflect) -> Box<dyn Reflect> {
    if let Ok(desc) = descriptor_of_value(value) {
        if let Some(TypeFn::Clone(clone)) = desc.function(FN_CLONE) {
            return clone(value);
        }
    }
    value.clone_boxed()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use serde_json::json;

    use super::*;
    use crate::test_support::{register_test_types, Greeting, Holder, PurposeAware, PurposeFilterType, Vec2, Vec3};

    fn round_trip<T>(value: &T) -> T
    where
        T: Clone + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static,
    {
        let json = serialize_value(value, Purpose::Generic).unwrap();
        let mut restored = T::default();
        deserialize_value(&json, &mut restored).unwrap();
        assert_eq!(&restored, value);
        restored
    }

    #[test]
    fn primitives_round_trip() {
        register_test_types();
        round_trip(&42_i32);
        round_trip(&-42_i64);
        round_trip(&42_u32);
        round_trip(&3.5_f32);
        round_trip(&-2.25_f64);
        round_trip(&true);
        round_trip(&false);
        round_trip(&'x');
        round_trip(&String::from("hello"));
    }

    #[test]
    fn vec2_uses_the_custom_functions() {
        register_test_types();
        let value = Vec2 { x: 1.0, y: 2.5 };
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(json, json!({ "x": 1.0, "y": 2.5 }));
        round_trip(&value);
    }

    #[test]
    fn nested_struct_round_trip() {
        register_test_types();
        round_trip(&Vec3 {
            xy: Vec2 { x: 1.0, y: 2.0 },
            z: 3.0,
        });
    }

    #[test]
    fn enum_serializes_as_the_entry_name() {
        register_test_types();
        let value = Greeting::Hola;
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(json, json!("Hola"));
        assert_eq!(round_trip(&value), Greeting::Hola);
    }

    #[test]
    fn sequence_round_trip_preserves_order_and_length() {
        register_test_types();
        let value = vec![
            Vec3 { xy: Vec2 { x: 1.0, y: 2.0 }, z: 3.0 },
            Vec3 { xy: Vec2 { x: 10.0, y: 20.0 }, z: 30.0 },
        ];
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        round_trip(&value);
    }

    #[test]
    fn fixed_array_deserializes_into_a_default_instance() {
        register_test_types();
        let value: [Vec3; 2] = [
            Vec3 { xy: Vec2 { x: 1.0, y: 2.0 }, z: 3.0 },
            Vec3 { xy: Vec2 { x: 10.0, y: 20.0 }, z: 30.0 },
        ];
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        let mut restored: [Vec3; 2] = Default::default();
        deserialize_value(&json, &mut restored).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn fixed_array_rejects_other_lengths() {
        register_test_types();
        let mut restored: [Vec3; 2] = Default::default();
        let err = deserialize_value(&json!([]), &mut restored).unwrap_err();
        assert!(matches!(err, ReflectError::SequenceResize(0, _)));
    }

    #[test]
    fn map_with_compound_keys_round_trips_as_pairs() {
        register_test_types();
        let mut value = BTreeMap::new();
        value.insert(Vec3 { xy: Vec2 { x: 1.0, y: 2.0 }, z: 3.0 }, 4);
        value.insert(Vec3 { xy: Vec2 { x: 5.0, y: 6.0 }, z: 7.0 }, 8);
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.as_array().unwrap().len() == 2));
        round_trip(&value);
    }

    #[test]
    fn set_round_trips_as_keys() {
        register_test_types();
        let value: BTreeSet<i32> = [1, 2, 3].into_iter().collect();
        let json = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(json, json!([1, 2, 3]));
        round_trip(&value);
    }

    fn keys_of(json: &Value) -> Vec<String> {
        let mut keys: Vec<String> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn purpose_filters_fields() {
        register_test_types();
        let value = PurposeFilterType::default();

        let file = serialize_value(&value, Purpose::File).unwrap();
        assert_eq!(keys_of(&file), ["a", "c", "d"]);

        let undo = serialize_value(&value, Purpose::Undo).unwrap();
        assert_eq!(keys_of(&undo), ["a", "b", "d"]);

        let display = serialize_value(&value, Purpose::Display).unwrap();
        assert_eq!(keys_of(&display), ["a", "b", "c"]);

        let generic = serialize_value(&value, Purpose::Generic).unwrap();
        assert_eq!(keys_of(&generic), ["a", "b", "c", "d"]);
    }

    #[test]
    fn excluded_fields_survive_a_filtered_round_trip() {
        register_test_types();
        let value = PurposeFilterType { a: 10, b: 20, c: 30, d: 40, e: 50 };
        let json = serialize_value(&value, Purpose::File).unwrap();
        let mut restored = PurposeFilterType::default();
        deserialize_value(&json, &mut restored).unwrap();
        // Filtered fields keep their defaults.
        assert_eq!(
            restored,
            PurposeFilterType { a: 10, b: 2, c: 30, d: 40, e: 5 }
        );
    }

    #[test]
    fn purpose_aware_serializer_receives_the_purpose() {
        register_test_types();
        let value = PurposeAware { value: 11 };
        let file = serialize_value(&value, Purpose::File).unwrap();
        assert_eq!(file["purpose"], json!("file"));
        let display = serialize_value(&value, Purpose::Display).unwrap();
        assert_eq!(display["purpose"], json!("display"));
    }

    #[test]
    fn legacy_serializer_is_selected_without_a_purpose_aware_variant() {
        register_test_types();
        let value = Vec2 { x: 1.0, y: 2.0 };
        let json = serialize_value(&value, Purpose::File).unwrap();
        assert_eq!(json, json!({ "x": 1.0, "y": 2.0 }));
    }

    #[test]
    fn unknown_keys_are_ignored_on_deserialize() {
        register_test_types();
        let mut restored = Holder::default();
        deserialize_value(
            &json!({ "items": [1, 2], "ghost": true }),
            &mut restored,
        )
        .unwrap();
        assert_eq!(restored.items, vec![1, 2]);
    }

    #[test]
    fn concurrent_serialize_matches_sequential() {
        register_test_types();
        let value = Vec2 { x: 1.23, y: 4.56 };
        let expected = serialize_value(&value, Purpose::Generic).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let expected = expected.clone();
                let value = value.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let json = serialize_value(&value, Purpose::Generic).unwrap();
                        assert_eq!(json, expected);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
    }
}
