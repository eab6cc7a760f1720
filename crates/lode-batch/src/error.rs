use lode_core::Guid;
use thiserror::Error;

/// Error for batch-registry operations.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("no index loaded")]
    NoIndex,

    #[error("unknown batch {0}")]
    UnknownBatch(Guid),

    #[error("batch {0} is not in the required state")]
    InvalidState(Guid),

    #[error("malformed batch file: {0}")]
    MalformedBatchFile(String),

    #[error("io error on '{0}': {1}")]
    Io(String, String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Reflect(#[from] lode_reflect::ReflectError),
}
