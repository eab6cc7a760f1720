use std::any::Any;

/// Object-safe access to a reflected value.
///
/// Implemented for every `'static` clonable type through the blanket impl, so
/// any value the engine stores can be passed around as `&dyn Reflect` and
/// resolved against the registry by its dynamic type.
pub trait Reflect: Any + Send + Sync {
    /// Upcast to [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Upcast to mutable [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Consumes the box into an [`Any`] box, for owned downcasts.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Returns an owned clone behind the trait object.
    fn clone_boxed(&self) -> Box<dyn Reflect>;

    /// Overwrites `self` with `value` if the dynamic types match.
    fn assign(&mut self, value: &dyn Reflect) -> bool;
}

impl<T: Any + Send + Sync + Clone> Reflect for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_boxed(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }

    fn assign(&mut self, value: &dyn Reflect) -> bool {
        match value.as_any().downcast_ref::<T>() {
            Some(value) => {
                *self = value.clone();
                true
            }
            None => false,
        }
    }
}

/// Note: Based on impl of dyn Any
impl dyn Reflect {
    /// Returns `true` if the referenced value is of type `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().type_id() == std::any::TypeId::of::<T>()
    }

    /// Returns some reference to the value if it is of type `T`.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns some mutable reference to the value if it is of type `T`.
    #[inline]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Downcasts a reflected value to its concrete type.
///
/// Reflection accessors are registered per type and dispatched by the value's
/// dynamic type, so a mismatch here is a programming error and aborts.
#[inline]
pub fn of<T: Any>(value: &dyn Reflect) -> &T {
    value
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("reflected value is not a {}", std::any::type_name::<T>()))
}

/// Mutable variant of [`of`].
#[inline]
pub fn of_mut<T: Any>(value: &mut dyn Reflect) -> &mut T {
    value
        .downcast_mut::<T>()
        .unwrap_or_else(|| panic!("reflected value is not a {}", std::any::type_name::<T>()))
}

/// Builds the getter/setter pair for one struct field, for use with
/// [`TypeBuilder::data`](crate::TypeBuilder::data).
#[macro_export]
macro_rules! field_accessors {
    ($owner:ty, $field:ident) => {
        (
            |value| &$crate::of::<$owner>(value).$field,
            |value| &mut $crate::of_mut::<$owner>(value).$field,
        )
    };
}
