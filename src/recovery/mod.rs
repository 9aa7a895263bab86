//! Recovery subsystem
//!
//! Replays the transaction log from the position of the latest checkpoint,
//! strictly in record order, re-applying every durable transaction to the
//! storage engine and rebuilding the id store's view of the world.
//!
//! # Rules
//!
//! - Replay is single-threaded and sequential
//! - A torn tail (crash mid-append) is truncated, never replayed partially
//! - A chain missing its final batch is torn: none of it replays
//! - Mid-log corruption halts recovery; no skipping, no repair
//! - A replayed transaction that fails to apply halts recovery explicitly

mod errors;
mod replay;

pub use errors::{RecoveryError, RecoveryErrorCode, RecoveryResult};
pub use replay::{RecoveryManager, RecoveryOutcome};
