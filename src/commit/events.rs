//! Commit tracing events
//!
//! The commit process reports its progress through this seam so callers can
//! hang metrics or tracing off the pipeline without the pipeline knowing
//! about either. All hooks default to no-ops; `NullCommitEvent` is the
//! explicit "not interested" implementation.

use crate::txid::TransactionId;

/// Observer of one `commit` call's lifecycle.
pub trait CommitEvent {
    /// The whole chain is durably appended; `last_transaction_id` is the id
    /// of the final batch.
    fn append_completed(&self, last_transaction_id: TransactionId) {
        let _ = last_transaction_id;
    }

    /// The storage engine accepted the whole chain.
    fn apply_completed(&self, last_transaction_id: TransactionId) {
        let _ = last_transaction_id;
    }

    /// One transaction's id bookkeeping was closed (success or failure path).
    fn transaction_closed(&self, transaction_id: TransactionId) {
        let _ = transaction_id;
    }
}

/// No-op commit event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCommitEvent;

impl CommitEvent for NullCommitEvent {}
