//! Commitment - per-transaction promise of id bookkeeping
//!
//! A commitment starts unbound, is bound to an id by the appender, may be
//! published exactly once by the commit process after a successful apply, and
//! is closed exactly once during finalization regardless of outcome.
//!
//! State transitions:
//!
//! ```text
//! Unbound --bind_to--> Bound --publish--> Published
//!    |                   |                    |
//!    +------------- mark_closed -------------+
//! ```
//!
//! Misuse (publish before bind, publish twice, close twice) is a caller
//! contract violation and panics; it is never retried or mapped to a Result.
//! A bound-but-never-published commitment still closes its id, so no id is
//! ever permanently open.

use std::sync::Arc;

use crate::txid::{TransactionId, TransactionIdStore};
use crate::txlog::LogPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitmentState {
    Unbound,
    Bound {
        transaction_id: TransactionId,
    },
    Published {
        transaction_id: TransactionId,
        checksum: u32,
        commit_timestamp: u64,
    },
}

/// Promise object bound to one committing transaction.
#[derive(Debug)]
pub struct Commitment {
    id_store: Arc<TransactionIdStore>,
    state: CommitmentState,
    closed: bool,
}

impl Commitment {
    pub fn new(id_store: Arc<TransactionIdStore>) -> Self {
        Self {
            id_store,
            state: CommitmentState::Unbound,
            closed: false,
        }
    }

    /// Called once by the appender immediately after id allocation, before
    /// the durable write is acknowledged.
    pub fn bind_to(&mut self, transaction_id: TransactionId) {
        match self.state {
            CommitmentState::Unbound => {
                self.state = CommitmentState::Bound { transaction_id };
            }
            _ => panic!(
                "commitment already bound, cannot rebind to transaction {}",
                transaction_id
            ),
        }
    }

    /// Publishes the final checksum and commit timestamp into the id store.
    ///
    /// Called once by the commit process, only after a successful apply.
    pub fn publish(&mut self, checksum: u32, commit_timestamp: u64) {
        match self.state {
            CommitmentState::Bound { transaction_id } => {
                self.id_store
                    .transaction_committed(transaction_id, checksum, commit_timestamp);
                self.state = CommitmentState::Published {
                    transaction_id,
                    checksum,
                    commit_timestamp,
                };
            }
            CommitmentState::Unbound => {
                panic!("commitment published before an id was bound")
            }
            CommitmentState::Published { transaction_id, .. } => {
                panic!("commitment for transaction {} published twice", transaction_id)
            }
        }
    }

    /// Reports closure to the id store. Called exactly once per instance
    /// during finalization, on success and failure paths alike.
    ///
    /// An unbound commitment (append failed before allocation) has no id to
    /// close; the call is still recorded so a second close is caught.
    pub fn mark_closed(
        &mut self,
        chain_length: u64,
        commit_timestamp: u64,
        log_position: LogPosition,
        checksum: u32,
    ) {
        if self.closed {
            panic!("commitment closed twice");
        }
        self.closed = true;
        if let Some(transaction_id) = self.transaction_id() {
            self.id_store.transaction_closed(
                transaction_id,
                chain_length,
                commit_timestamp,
                log_position,
                checksum,
            );
        }
    }

    /// The bound id, if the appender got that far.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self.state {
            CommitmentState::Unbound => None,
            CommitmentState::Bound { transaction_id }
            | CommitmentState::Published { transaction_id, .. } => Some(transaction_id),
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.state, CommitmentState::Unbound)
    }

    pub fn is_published(&self) -> bool {
        matches!(self.state, CommitmentState::Published { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
