//! Batch registry: named, persistable units of live entities plus the
//! transitive closure of asset GUIDs they reference.
//!
//! All state-changing batch operations are serialized through a per-registry
//! strand; entity-registry work is bridged onto the main thread, asset work
//! goes through the resource manager.

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod error;
pub use error::*;

mod batch;
pub use batch::*;

mod events;
pub use events::*;

mod entity_meta;
pub use entity_meta::*;

mod closure;

mod registry;
pub use registry::*;
