use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use lode_core::TypeId;

use crate::{
    register_descriptor, EnumEntry, EnumLayout, FieldDescriptor, FieldId, FnName, MetaFlags,
    Reflect, ReflectError, StructLayout, TypeDescriptor, TypeFn, TypeKind,
};

fn leak_str(text: &str) -> &'static str {
    Box::leak(text.to_owned().into_boxed_str())
}

/// Fluent registration of a struct type.
///
/// Field-level calls (`field_display_name`, `field_flags`, ...) configure the
/// most recently added field, mirroring the chained registration style used
/// throughout the engine.
pub struct TypeBuilder<T> {
    id_string: &'static str,
    display_name: &'static str,
    tooltip: &'static str,
    flags: MetaFlags,
    fields: Vec<FieldDescriptor>,
    functions: HashMap<FnName, TypeFn>,
    _marker: PhantomData<fn() -> T>,
}

/// Getter/setter pair of one data field; build it with
/// [`field_accessors!`](crate::field_accessors).
pub type FieldAccessors = (
    fn(&dyn Reflect) -> &dyn Reflect,
    fn(&mut dyn Reflect) -> &mut dyn Reflect,
);

impl<T: Any + Send + Sync + Clone + Default> TypeBuilder<T> {
    /// Starts a builder for `T` under the given id-string.
    pub fn new(id_string: &str) -> Self {
        let id_string = leak_str(id_string);
        Self {
            id_string,
            display_name: id_string,
            tooltip: "",
            flags: MetaFlags::NONE,
            fields: Vec::new(),
            functions: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Sets the display name of the type.
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = leak_str(name);
        self
    }

    /// Sets the tooltip of the type.
    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = leak_str(tooltip);
        self
    }

    /// Sets the trait flags of the type.
    pub fn flags(mut self, flags: MetaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a data field.
    pub fn data(mut self, name: &str, accessors: FieldAccessors) -> Self {
        let name = leak_str(name);
        self.fields.push(FieldDescriptor {
            id: FieldId::from_name(name),
            name,
            display_name: name,
            tooltip: "",
            flags: MetaFlags::NONE,
            get: accessors.0,
            get_mut: accessors.1,
        });
        self
    }

    fn last_field(&mut self) -> &mut FieldDescriptor {
        self.fields
            .last_mut()
            .expect("field configuration before any data() call")
    }

    /// Sets the display name of the last added field.
    pub fn field_display_name(mut self, name: &str) -> Self {
        self.last_field().display_name = leak_str(name);
        self
    }

    /// Sets the tooltip of the last added field.
    pub fn field_tooltip(mut self, tooltip: &str) -> Self {
        self.last_field().tooltip = leak_str(tooltip);
        self
    }

    /// Sets the trait flags of the last added field.
    pub fn field_flags(mut self, flags: MetaFlags) -> Self {
        self.last_field().flags = flags;
        self
    }

    /// Registers a named function on the type.
    pub fn function(mut self, name: FnName, function: TypeFn) -> Self {
        self.functions.insert(name, function);
        self
    }

    /// Builds the descriptor and registers it.
    pub fn register(self) -> Result<&'static TypeDescriptor, ReflectError> {
        register_descriptor(TypeDescriptor {
            type_id: TypeId::from_name(self.id_string),
            id_string: self.id_string,
            display_name: self.display_name,
            tooltip: self.tooltip,
            rust_id: std::any::TypeId::of::<T>(),
            flags: self.flags,
            kind: TypeKind::Struct(StructLayout {
                fields: self.fields,
            }),
            make_default: || Box::new(T::default()),
            functions: self.functions,
        })
    }
}

/// Fluent registration of an enum type.
pub struct EnumBuilder<T> {
    id_string: &'static str,
    display_name: &'static str,
    tooltip: &'static str,
    underlying: &'static str,
    entries: Vec<EnumEntry>,
    read: fn(&dyn Reflect) -> i64,
    write: fn(&mut dyn Reflect, i64) -> Result<(), ReflectError>,
    functions: HashMap<FnName, TypeFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync + Clone + Default> EnumBuilder<T> {
    /// Starts a builder for `T` with its underlying-value conversions.
    pub fn new(
        id_string: &str,
        read: fn(&dyn Reflect) -> i64,
        write: fn(&mut dyn Reflect, i64) -> Result<(), ReflectError>,
    ) -> Self {
        let id_string = leak_str(id_string);
        Self {
            id_string,
            display_name: id_string,
            tooltip: "",
            underlying: "i64",
            entries: Vec::new(),
            read,
            write,
            functions: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Sets the display name of the enum.
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = leak_str(name);
        self
    }

    /// Sets the tooltip of the enum.
    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = leak_str(tooltip);
        self
    }

    /// Names the underlying type, for diagnostics.
    pub fn underlying(mut self, name: &str) -> Self {
        self.underlying = leak_str(name);
        self
    }

    /// Adds a named entry.
    pub fn entry(mut self, name: &str, value: i64) -> Self {
        self.entries.push(EnumEntry {
            name: leak_str(name),
            value,
            tooltip: "",
        });
        self
    }

    /// Sets the tooltip of the last added entry.
    pub fn entry_tooltip(mut self, tooltip: &str) -> Self {
        self.entries
            .last_mut()
            .expect("entry configuration before any entry() call")
            .tooltip = leak_str(tooltip);
        self
    }

    /// Registers a named function on the enum.
    pub fn function(mut self, name: FnName, function: TypeFn) -> Self {
        self.functions.insert(name, function);
        self
    }

    /// Builds the descriptor and registers it.
    pub fn register(self) -> Result<&'static TypeDescriptor, ReflectError> {
        register_descriptor(TypeDescriptor {
            type_id: TypeId::from_name(self.id_string),
            id_string: self.id_string,
            display_name: self.display_name,
            tooltip: self.tooltip,
            rust_id: std::any::TypeId::of::<T>(),
            flags: MetaFlags::NONE,
            kind: TypeKind::Enum(EnumLayout {
                underlying: self.underlying,
                entries: self.entries,
                read: self.read,
                write: self.write,
            }),
            make_default: || Box::new(T::default()),
            functions: self.functions,
        })
    }
}
