//! Shared fixture types for this crate's tests.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Once;

use serde_json::{json, Value};

use crate::{
    field_accessors, of, of_mut, register_array, register_btree_map, register_btree_set,
    register_vec, EnumBuilder, MetaFlags, Purpose, Reflect, ReflectError, TypeBuilder, TypeFn,
    FN_DESERIALIZE, FN_SERIALIZE,
};

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Eq for Vec2 {}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Vec3 {
    pub xy: Vec2,
    pub z: f32,
}

impl Eq for Vec3 {}

impl PartialOrd for Vec3 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Vec3 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.xy
            .x
            .total_cmp(&other.xy.x)
            .then(self.xy.y.total_cmp(&other.xy.y))
            .then(self.z.total_cmp(&other.z))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Greeting {
    #[default]
    Hello = 5,
    Bye = 6,
    Hola = 8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PurposeFilterType {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
    pub e: i32,
}

impl Default for PurposeFilterType {
    fn default() -> Self {
        Self { a: 1, b: 2, c: 3, d: 4, e: 5 }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct PurposeAware {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Holder {
    pub items: Vec<i32>,
    pub table: BTreeMap<i32, i32>,
}

fn serialize_vec2(value: &dyn Reflect) -> Result<Value, ReflectError> {
    let vec2 = of::<Vec2>(value);
    Ok(json!({ "x": vec2.x, "y": vec2.y }))
}

fn deserialize_vec2(json: &Value, value: &mut dyn Reflect) -> Result<(), ReflectError> {
    let vec2 = of_mut::<Vec2>(value);
    vec2.x = json["x"]
        .as_f64()
        .ok_or(ReflectError::UnexpectedJson("number", "vec2"))? as f32;
    vec2.y = json["y"]
        .as_f64()
        .ok_or(ReflectError::UnexpectedJson("number", "vec2"))? as f32;
    Ok(())
}

pub fn purpose_name(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Generic => "generic",
        Purpose::File => "file",
        Purpose::Undo => "undo",
        Purpose::Display => "display",
    }
}

fn serialize_purpose_aware(value: &dyn Reflect, purpose: Purpose) -> Result<Value, ReflectError> {
    Ok(json!({
        "value": of::<PurposeAware>(value).value,
        "purpose": purpose_name(purpose),
    }))
}

pub fn register_test_types() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        TypeBuilder::<Vec2>::new("vec2")
            .tooltip("A 2D vector type.")
            .data("x", field_accessors!(Vec2, x))
            .data("y", field_accessors!(Vec2, y))
            .function(FN_SERIALIZE, TypeFn::SerializeLegacy(serialize_vec2))
            .function(FN_DESERIALIZE, TypeFn::Deserialize(deserialize_vec2))
            .register()
            .unwrap();

        TypeBuilder::<Vec3>::new("vec3")
            .tooltip("A 3D vector type.")
            .data("xy", field_accessors!(Vec3, xy))
            .data("z", field_accessors!(Vec3, z))
            .register()
            .unwrap();

        EnumBuilder::<Greeting>::new(
            "Greeting",
            |value| *of::<Greeting>(value) as i64,
            |value, raw| {
                *of_mut::<Greeting>(value) = match raw {
                    5 => Greeting::Hello,
                    6 => Greeting::Bye,
                    8 => Greeting::Hola,
                    _ => return Err(ReflectError::EnumValueNotNamed("Greeting", raw)),
                };
                Ok(())
            },
        )
        .underlying("i32")
        .entry("Hello", 5)
        .entry_tooltip("Greeting in English.")
        .entry("Bye", 6)
        .entry("Hola", 8)
        .entry_tooltip("Greeting in Spanish.")
        .register()
        .unwrap();

        TypeBuilder::<PurposeFilterType>::new("PurposeFilterType")
            .tooltip("Purpose-filtered fields.")
            .data("a", field_accessors!(PurposeFilterType, a))
            .data("b", field_accessors!(PurposeFilterType, b))
            .field_flags(MetaFlags::NO_SERIALIZE_FILE)
            .data("c", field_accessors!(PurposeFilterType, c))
            .field_flags(MetaFlags::NO_SERIALIZE_UNDO)
            .data("d", field_accessors!(PurposeFilterType, d))
            .field_flags(MetaFlags::NO_SERIALIZE_DISPLAY)
            .data("e", field_accessors!(PurposeFilterType, e))
            .field_flags(MetaFlags::NO_SERIALIZE)
            .register()
            .unwrap();

        TypeBuilder::<PurposeAware>::new("PurposeAware")
            .data("value", field_accessors!(PurposeAware, value))
            .function(FN_SERIALIZE, TypeFn::Serialize(serialize_purpose_aware))
            .register()
            .unwrap();

        register_vec::<i32>().unwrap();
        register_vec::<Vec3>().unwrap();
        register_array::<Vec3, 2>().unwrap();
        register_btree_map::<Vec3, i32>().unwrap();
        register_btree_map::<i32, i32>().unwrap();
        register_btree_set::<i32>().unwrap();

        TypeBuilder::<Holder>::new("Holder")
            .data("items", field_accessors!(Holder, items))
            .data("table", field_accessors!(Holder, table))
            .register()
            .unwrap();
    });
}
