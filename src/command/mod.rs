//! Command construction: immutable command specs, the pattern resolver that
//! expands argument templates, and the logical-name resolution seam.

mod pattern;
mod resolve;
mod spec;

pub use pattern::*;
pub use resolve::*;
pub use spec::*;
