//! Storage engine boundary
//!
//! The durability pipeline hands fully-appended transaction chains to the
//! storage engine through this seam. The engine owns its own locking; the
//! pipeline only guarantees that a chain arrives after its log records are
//! durable, and that recovery re-presents chains strictly in log order.

use thiserror::Error;

use crate::commit::TransactionChain;

/// How a chain is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// A normal commit from a user transaction.
    External,
    /// Internal work (maintenance, system transactions).
    Internal,
    /// Replay during recovery: the log record already exists, so the engine
    /// tolerates re-applied creates and deletes of missing entities.
    Recovery,
}

impl ApplicationMode {
    /// True when replaying already-durable records.
    pub fn is_recovery(&self) -> bool {
        matches!(self, ApplicationMode::Recovery)
    }
}

/// Storage apply errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Node not found: {0}")]
    NodeNotFound(u64),

    #[error("Node already exists: {0}")]
    NodeAlreadyExists(u64),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(u64),

    #[error("Relationship already exists: {0}")]
    RelationshipAlreadyExists(u64),

    #[error("Node {0} still has relationships")]
    NodeHasRelationships(u64),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Engine fault: {0}")]
    EngineFault(String),
}

/// Result type for storage operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// The storage engine as seen by the commit process, the check pointer, and
/// recovery.
pub trait StorageEngine: Send + Sync {
    /// Applies a fully-appended chain, batch by batch, in chain order.
    fn apply(&self, chain: &TransactionChain, mode: ApplicationMode) -> ApplyResult<()>;

    /// Forces the engine's durable state down to disk, up to everything
    /// applied so far. Called by the check pointer before it writes a
    /// checkpoint record.
    fn flush(&self) -> ApplyResult<()>;
}
