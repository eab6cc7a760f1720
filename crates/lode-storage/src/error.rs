use lode_core::{Guid, TypeId};
use lode_reflect::ReflectError;
use thiserror::Error;

/// Error for pool and storage operations.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid guid")]
    InvalidGuid,

    #[error("guid {0} is already bound in this pool")]
    GuidAlreadyBound(Guid),

    #[error("invalid or stale handle")]
    InvalidHandle,

    #[error("handle does not belong to this pool's type")]
    HandleTypeMismatch,

    #[error("no pool for type {0:?}")]
    PoolNotFound(TypeId),

    #[error("type '{0}' must be reflected before a pool is created")]
    TypeNotReflected(String),

    #[error("pool alignment {0} is not a power of two at least the natural alignment")]
    InvalidAlignment(usize),

    #[error(transparent)]
    Reflect(#[from] ReflectError),
}
