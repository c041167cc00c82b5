//! Process supervision: the launcher seam, worker events, the per-process
//! supervisor with its I/O pump, the process-wide registry, and the
//! synchronous exec variant.

use std::time::Duration;

mod error;
mod events;
mod exec;
mod launcher;
mod registry;
mod supervisor;

pub use error::*;
pub use events::*;
pub use exec::*;
pub use launcher::*;
pub use registry::*;
pub use supervisor::*;

/// Interval between pump iterations while the child is quiet.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Size of the buffer used for each pipe read.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Maximum number of bytes written to the child's stdin per write call.
pub const STDIN_SLICE_SIZE: usize = 1024;
