//! syswork - external process supervision with streamed I/O.
//!
//! The crate is split in two areas: [`command`] builds immutable command
//! specifications, including a pattern resolver for argument templates, and
//! [`worker`] runs them, either supervised with streamed output events or
//! synchronously with collected output.

pub mod command;
pub mod worker;
