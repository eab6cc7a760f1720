use lode_core::Guid;
use lode_reflect::ReflectError;
use lode_storage::StorageError;
use thiserror::Error;

/// Error for resource-manager operations.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("asset {0} is not in the index")]
    NotInIndex(Guid),

    #[error("asset {0} has no lease for the requesting batch")]
    NoLease(Guid),

    #[error("asset {0} is not loaded")]
    NotLoaded(Guid),

    #[error("asset {0} previously failed to load: {1}")]
    LoadFailed(Guid, String),

    #[error("type '{0}' does not register '{1}'")]
    MissingTypeFunction(String, &'static str),

    #[error("io error on '{0}': {1}")]
    Io(String, String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Reflect(#[from] ReflectError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
