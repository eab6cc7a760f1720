//! Runtime type reflection.
//!
//! Every type that wants to participate in serialization, inspection or
//! path-addressed editing registers a [`TypeDescriptor`] with the global
//! [`registry`](crate::registry). A descriptor carries the type's identity,
//! trait flags, ordered data fields, enum entries or container operations, and
//! an optional table of named functions that collaborating systems dispatch
//! through a uniform call site.

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod error;
pub use error::*;

mod flags;
pub use flags::*;

mod reflect;
pub use reflect::*;

mod descriptor;
pub use descriptor::*;

mod functions;
pub use functions::*;

mod registry;
pub use registry::*;

mod builder;
pub use builder::*;

mod containers;
pub use containers::*;

mod serialize;
pub use serialize::*;

mod path;
pub use path::*;

mod primitives;

#[cfg(test)]
pub(crate) mod test_support;
