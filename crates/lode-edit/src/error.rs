use thiserror::Error;

/// Error for command construction.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum EditError {
    #[error("command has no target")]
    MissingTarget,

    #[error("command is missing its {0} value")]
    MissingValue(&'static str),

    #[error(transparent)]
    Reflect(#[from] lode_reflect::ReflectError),
}
