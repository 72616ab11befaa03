//! Structured logging setup.
//!
//! Logs go to stderr in one of three formats (pretty, compact, JSON) so that
//! command output on stdout stays machine-readable.

mod tracing_init;

pub use tracing_init::*;
