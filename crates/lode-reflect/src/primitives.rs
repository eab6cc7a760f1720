//! Built-in descriptors for primitive leaf types, installed when the registry
//! is first touched.

use std::collections::HashMap;

use lode_core::TypeId;
use serde_json::Value;

use crate::registry::{insert_descriptor, RegistryInner};
use crate::{of, of_mut, PrimitiveOps, Reflect, ReflectError, TypeDescriptor, TypeKind};

fn json_to_i64(json: &Value, type_name: &'static str) -> Result<i64, ReflectError> {
    json.as_i64()
        .or_else(|| json.as_u64().map(|value| value as i64))
        .or_else(|| json.as_f64().map(|value| value as i64))
        .ok_or(ReflectError::UnexpectedJson("number", type_name))
}

fn json_to_u64(json: &Value, type_name: &'static str) -> Result<u64, ReflectError> {
    json.as_u64()
        .or_else(|| json.as_i64().map(|value| value as u64))
        .or_else(|| json.as_f64().map(|value| value as u64))
        .ok_or(ReflectError::UnexpectedJson("number", type_name))
}

fn json_to_f64(json: &Value, type_name: &'static str) -> Result<f64, ReflectError> {
    json.as_f64()
        .ok_or(ReflectError::UnexpectedJson("number", type_name))
}

macro_rules! primitive_descriptor {
    ($inner:expr, $ty:ty, $name:literal, $from:expr) => {
        insert_descriptor(
            $inner,
            TypeDescriptor {
                type_id: TypeId::from_name($name),
                id_string: $name,
                display_name: $name,
                tooltip: "",
                rust_id: std::any::TypeId::of::<$ty>(),
                flags: crate::MetaFlags::NONE,
                kind: TypeKind::Primitive(PrimitiveOps {
                    to_json: |value: &dyn Reflect| {
                        serde_json::to_value(of::<$ty>(value)).map_err(ReflectError::from)
                    },
                    from_json: $from,
                }),
                make_default: || Box::new(<$ty>::default()),
                functions: HashMap::new(),
            },
        )
        .expect("builtin primitive registration");
    };
}

macro_rules! signed_primitive {
    ($inner:expr, $ty:ty, $name:literal) => {
        primitive_descriptor!($inner, $ty, $name, |value: &mut dyn Reflect,
                                                   json: &Value| {
            *of_mut::<$ty>(value) = json_to_i64(json, $name)? as $ty;
            Ok(())
        });
    };
}

macro_rules! unsigned_primitive {
    ($inner:expr, $ty:ty, $name:literal) => {
        primitive_descriptor!($inner, $ty, $name, |value: &mut dyn Reflect,
                                                   json: &Value| {
            *of_mut::<$ty>(value) = json_to_u64(json, $name)? as $ty;
            Ok(())
        });
    };
}

macro_rules! float_primitive {
    ($inner:expr, $ty:ty, $name:literal) => {
        primitive_descriptor!($inner, $ty, $name, |value: &mut dyn Reflect,
                                                   json: &Value| {
            *of_mut::<$ty>(value) = json_to_f64(json, $name)? as $ty;
            Ok(())
        });
    };
}

pub(crate) fn register_builtin(inner: &mut RegistryInner) {
    primitive_descriptor!(inner, bool, "bool", |value: &mut dyn Reflect, json: &Value| {
        *of_mut::<bool>(value) = json
            .as_bool()
            .ok_or(ReflectError::UnexpectedJson("bool", "bool"))?;
        Ok(())
    });

    signed_primitive!(inner, i8, "i8");
    signed_primitive!(inner, i16, "i16");
    signed_primitive!(inner, i32, "i32");
    signed_primitive!(inner, i64, "i64");
    signed_primitive!(inner, isize, "isize");
    unsigned_primitive!(inner, u8, "u8");
    unsigned_primitive!(inner, u16, "u16");
    unsigned_primitive!(inner, u32, "u32");
    unsigned_primitive!(inner, u64, "u64");
    unsigned_primitive!(inner, usize, "usize");
    float_primitive!(inner, f32, "f32");
    float_primitive!(inner, f64, "f64");

    primitive_descriptor!(inner, char, "char", |value: &mut dyn Reflect, json: &Value| {
        let text = json
            .as_str()
            .ok_or(ReflectError::UnexpectedJson("string", "char"))?;
        *of_mut::<char>(value) = text
            .chars()
            .next()
            .ok_or(ReflectError::UnexpectedJson("non-empty string", "char"))?;
        Ok(())
    });

    primitive_descriptor!(inner, String, "String", |value: &mut dyn Reflect,
                                                    json: &Value| {
        *of_mut::<String>(value) = json
            .as_str()
            .ok_or(ReflectError::UnexpectedJson("string", "String"))?
            .to_owned();
        Ok(())
    });
}
