//! plexdb - an embedded, crash-safe graph database
//!
//! This crate is the durability core: the pipeline that turns an in-memory
//! description of a committed transaction into a durable, ordered,
//! recoverable log entry, applies its effects to the storage engine, and
//! bounds recovery cost with checkpoints.
//!
//! # Invariants Enforced
//!
//! - Transaction ids are allocated in strictly increasing order, never reused
//! - A transaction is appended to the log before it is applied to storage
//! - Every allocated id is closed exactly once, whatever the outcome
//! - Checkpoints reference only closed, applied transactions
//! - fsync before acknowledgment; a torn tail is truncated, never replayed

pub mod checkpoint;
pub mod commit;
pub mod crash_point;
pub mod observability;
pub mod recovery;
pub mod storage;
pub mod txid;
pub mod txlog;
