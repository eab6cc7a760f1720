//! Concurrency primitives of the runtime: a fixed worker pool handing out
//! shared-future [`Task`]s, the [`Strand`] serial executor, the
//! [`MainThreadQueue`] drained once per frame, and the typed [`EventQueue`].

// crate-specific lint exceptions:
#![allow(clippy::missing_errors_doc)]
#![warn(missing_docs)]

mod task;
pub use task::*;

mod strand;
pub use strand::*;

mod main_thread;
pub use main_thread::*;

mod event_queue;
pub use event_queue::*;
