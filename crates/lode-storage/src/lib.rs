//! Typed object pools and the process-wide heterogeneous storage.
//!
//! Each [`Pool`] is a slab of versioned slots with an embedded free-list,
//! reference counts and a GUID map in both directions. [`Storage`] owns one
//! pool per registered type and dispatches untyped operations through the
//! reflection layer.

// crate-specific lint exceptions:
#![allow(unsafe_code, clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod error;
pub use error::*;

mod raw_pool;

mod maps;

mod pool;
pub use pool::*;

mod storage;
pub use storage::*;

mod refs;
pub use refs::*;
