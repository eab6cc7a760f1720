use lode_core::TypeId;
use thiserror::Error;

/// Error for the reflection system.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum ReflectError {
    #[error("type '{0}' is not registered")]
    TypeNotRegistered(String),

    #[error("type id {0:?} is not registered")]
    TypeIdNotRegistered(TypeId),

    #[error("field '{0}' not found on '{1}'")]
    FieldNotFound(String, &'static str),

    #[error("enum entry '{0}' not found on '{1}'")]
    EnumEntryNotFound(String, &'static str),

    #[error("no entry named for value {1} on enum '{0}'")]
    EnumValueNotNamed(&'static str, i64),

    #[error("index {0} out of bounds on '{1}'")]
    IndexOutOfBounds(usize, &'static str),

    #[error("key '{0}' not found on '{1}'")]
    KeyNotFound(String, &'static str),

    #[error("cannot resize '{1}' to length {0}")]
    SequenceResize(usize, &'static str),

    #[error("expected {0} while deserializing '{1}'")]
    UnexpectedJson(&'static str, &'static str),

    #[error("invalid meta path: {0}")]
    InvalidPath(String),

    #[error("value type mismatch when assigning '{0}'")]
    AssignMismatch(String),

    #[error("registration rejected: {0}")]
    Registration(String),

    #[error("{path}: {inner}")]
    Field {
        /// Path of the field the inner error surfaced on.
        path: String,
        /// Stringified inner error.
        inner: String,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}'")]
    Generic(String),
}

impl ReflectError {
    /// Wraps an error with the field path it surfaced on.
    pub fn in_field(self, path: impl Into<String>) -> Self {
        Self::Field {
            path: path.into(),
            inner: self.to_string(),
        }
    }
}
