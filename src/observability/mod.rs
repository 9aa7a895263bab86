//! Observability
//!
//! Structured, synchronous logging for the durability pipeline. Read-only
//! with respect to execution: nothing here affects commit, checkpoint, or
//! recovery behavior.

mod logger;

pub use logger::{Logger, Severity};
