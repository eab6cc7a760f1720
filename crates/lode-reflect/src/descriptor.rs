use std::collections::HashMap;

use lode_core::TypeId;
use serde_json::Value;
use xxhash_rust::const_xxh3::xxh3_64;

use crate::{FnName, MetaFlags, Reflect, ReflectError, TypeFn};

/// Interned id of a data field, the xxh3 hash of its name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldId(u64);

impl FieldId {
    /// Interns a field name. Usable in `const` contexts.
    pub const fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }

    /// Returns the raw hash value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Immutable record describing one registered type.
pub struct TypeDescriptor {
    /// Interned id of [`Self::id_string`].
    pub type_id: TypeId,
    /// The declared id-string of the type.
    pub id_string: &'static str,
    /// Human-readable name, defaults to the id-string.
    pub display_name: &'static str,
    /// Tooltip shown by inspection UIs.
    pub tooltip: &'static str,
    /// The Rust type behind this descriptor.
    pub rust_id: std::any::TypeId,
    /// Trait flags of the type itself.
    pub flags: MetaFlags,
    /// Shape-specific data and operations.
    pub kind: TypeKind,
    /// Returns a default-constructed boxed instance.
    pub make_default: fn() -> Box<dyn Reflect>,
    /// Named functions dispatched through the uniform reflection call site.
    pub functions: HashMap<FnName, TypeFn>,
}

impl TypeDescriptor {
    /// Returns the registered function stored under `name`, if any.
    pub fn function(&self, name: FnName) -> Option<&TypeFn> {
        self.functions.get(&name)
    }

    /// Looks up a data field by id. Errors on non-struct types.
    pub fn field(&self, id: FieldId) -> Result<&FieldDescriptor, ReflectError> {
        match &self.kind {
            TypeKind::Struct(layout) => layout
                .fields
                .iter()
                .find(|field| field.id == id)
                .ok_or_else(|| {
                    ReflectError::FieldNotFound(format!("{:?}", id), self.id_string)
                }),
            _ => Err(ReflectError::FieldNotFound(
                format!("{:?}", id),
                self.id_string,
            )),
        }
    }
}

/// Shape of a reflected type.
pub enum TypeKind {
    /// Leaf value with a fixed JSON cast.
    Primitive(PrimitiveOps),
    /// Ordered data fields.
    Struct(StructLayout),
    /// Named entries over an underlying integer type.
    Enum(EnumLayout),
    /// Sequence container (`Vec`, fixed arrays).
    Sequence(SequenceOps),
    /// Associative container (maps and sets).
    Map(MapOps),
}

/// JSON conversion functions of a primitive type.
pub struct PrimitiveOps {
    /// Emits the value as a JSON leaf.
    pub to_json: fn(&dyn Reflect) -> Result<Value, ReflectError>,
    /// Casts a JSON leaf into the value.
    pub from_json: fn(&mut dyn Reflect, &Value) -> Result<(), ReflectError>,
}

/// Field list of a struct type.
pub struct StructLayout {
    /// Ordered data fields.
    pub fields: Vec<FieldDescriptor>,
}

/// One data field of a struct type.
pub struct FieldDescriptor {
    /// Interned id of [`Self::name`].
    pub id: FieldId,
    /// Declared field name.
    pub name: &'static str,
    /// Display name, used as the serialization key.
    pub display_name: &'static str,
    /// Tooltip shown by inspection UIs.
    pub tooltip: &'static str,
    /// Trait flags of this field.
    pub flags: MetaFlags,
    /// Borrows the field from its owner.
    pub get: fn(&dyn Reflect) -> &dyn Reflect,
    /// Mutably borrows the field from its owner.
    pub get_mut: fn(&mut dyn Reflect) -> &mut dyn Reflect,
}

/// One named entry of an enum type.
pub struct EnumEntry {
    /// Entry name, used as the serialized form.
    pub name: &'static str,
    /// Underlying value.
    pub value: i64,
    /// Tooltip shown by inspection UIs.
    pub tooltip: &'static str,
}

/// Entries and conversions of an enum type.
pub struct EnumLayout {
    /// Name of the underlying type, for diagnostics.
    pub underlying: &'static str,
    /// Registered entries.
    pub entries: Vec<EnumEntry>,
    /// Reads the underlying value.
    pub read: fn(&dyn Reflect) -> i64,
    /// Writes the underlying value.
    pub write: fn(&mut dyn Reflect, i64) -> Result<(), ReflectError>,
}

impl EnumLayout {
    /// Finds an entry by name.
    pub fn entry_by_name(&self, name: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Finds an entry by underlying value.
    pub fn entry_by_value(&self, value: i64) -> Option<&EnumEntry> {
        self.entries.iter().find(|entry| entry.value == value)
    }
}

/// Mutable lookup function of an associative container.
pub type MapGetMutFn =
    for<'a> fn(&'a mut dyn Reflect, &Value) -> Result<&'a mut dyn Reflect, ReflectError>;

/// Operations of a sequence container.
pub struct SequenceOps {
    /// Element count.
    pub len: fn(&dyn Reflect) -> usize,
    /// Borrows an element.
    pub get: fn(&dyn Reflect, usize) -> Option<&dyn Reflect>,
    /// Mutably borrows an element.
    pub get_mut: fn(&mut dyn Reflect, usize) -> Option<&mut dyn Reflect>,
    /// Resizes to the requested length. Fixed-size sequences only accept
    /// their own length.
    pub resize: fn(&mut dyn Reflect, usize) -> Result<(), ReflectError>,
    /// Removes all elements where supported.
    pub clear: fn(&mut dyn Reflect) -> Result<(), ReflectError>,
}

/// Operations of an associative container.
pub struct MapOps {
    /// `true` for set-like containers without a mapped value.
    pub is_set: bool,
    /// Entry count.
    pub len: fn(&dyn Reflect) -> usize,
    /// Removes all entries.
    pub clear: fn(&mut dyn Reflect),
    /// Visits every entry as `(key, mapped)`; `mapped` is `None` for sets.
    pub visit: fn(&dyn Reflect, &mut dyn FnMut(&dyn Reflect, Option<&dyn Reflect>)),
    /// Inserts an entry from JSON key (and value, for mapped containers).
    pub insert_json: fn(&mut dyn Reflect, &Value, Option<&Value>) -> Result<(), ReflectError>,
    /// Mutably borrows the mapped value addressed by a JSON key.
    pub get_mut_json: MapGetMutFn,
}
