//! Identity primitives shared by every lode crate.
//!
//! Everything here is plain data: 64-bit [`Guid`]s, interned [`TypeId`]s,
//! versioned pool [`Handle`]s and the opaque [`EntityId`] used to address the
//! external entity registry.

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod guid;
pub use guid::*;

mod type_id;
pub use type_id::*;

mod handle;
pub use handle::*;

mod entity;
pub use entity::*;
