//! Edit command pipeline.
//!
//! Every mutating edit from the editor shell is an undoable [`Command`] run
//! on the main thread through a [`CommandQueue`]. Field-level edits address
//! their target with a [`lode_reflect::MetaFieldPath`] and carry both the
//! previous and the new value in serialized form.

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod error;
pub use error::*;

mod command;
pub use command::*;

mod events;
pub use events::*;

mod assign;
pub use assign::*;

mod structural;
pub use structural::*;
