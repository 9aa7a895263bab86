//! Transaction commit process
//!
//! A strict two-phase pipeline per chain: append, then apply, then an
//! unconditional close phase. Either the whole chain is durably logged and
//! applied, or a typed failure is raised - but id bookkeeping always
//! completes, so a failed commit never leaves an id permanently open.
//!
//! The phases are tracked in a `CommitAttempt` value carrying partial
//! results, and one finalization routine runs on every exit path. Nothing
//! here relies on unwinding to clean up.

use std::sync::Arc;

use super::batch::TransactionChain;
use super::errors::{CommitError, CommitResult};
use super::events::CommitEvent;
use crate::storage::{ApplicationMode, StorageEngine};
use crate::txid::TransactionId;
use crate::txlog::{LogPosition, TransactionAppender};

/// The commit pipeline as seen by the transaction-execution layer.
pub trait TransactionCommitProcess {
    /// Commits one chain: appends it durably, applies it to storage,
    /// publishes and closes id bookkeeping. Returns the id of the last
    /// batch on success.
    ///
    /// Never returns a successful id when apply failed.
    fn commit(
        &self,
        chain: TransactionChain,
        event: &dyn CommitEvent,
        mode: ApplicationMode,
    ) -> CommitResult<TransactionId>;
}

/// Partial results of one commit call. The failure slot is written at most
/// once: the first failing phase wins and later phases are skipped, but
/// finalization still runs.
#[derive(Debug)]
struct CommitAttempt {
    last_appended: Option<TransactionId>,
    failure: Option<CommitError>,
}

impl CommitAttempt {
    fn new() -> Self {
        Self {
            last_appended: None,
            failure: None,
        }
    }

    fn appended(&mut self, last_id: TransactionId) {
        self.last_appended = Some(last_id);
    }

    fn failed(&mut self, error: CommitError) {
        debug_assert!(self.failure.is_none(), "commit attempt failed twice");
        self.failure = Some(error);
    }

    fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    fn into_result(self) -> CommitResult<TransactionId> {
        match (self.failure, self.last_appended) {
            (Some(error), _) => Err(error),
            (None, Some(last_id)) => Ok(last_id),
            // Chains are non-empty by construction, so a successful append
            // always produced an id.
            (None, None) => Err(CommitError::invalid_chain(
                "append reported success without appending anything",
            )),
        }
    }
}

/// The standard commit process: append via the transaction appender, apply
/// via the storage engine, close via the commitments.
#[derive(Debug)]
pub struct InternalTransactionCommitProcess<A: TransactionAppender, S: StorageEngine> {
    appender: Arc<A>,
    storage: Arc<S>,
}

impl<A: TransactionAppender, S: StorageEngine> InternalTransactionCommitProcess<A, S> {
    pub fn new(appender: Arc<A>, storage: Arc<S>) -> Self {
        Self { appender, storage }
    }

    /// The close phase. Runs for every chain exactly once, on success and on
    /// both failure paths:
    ///
    /// - On success, publish each commitment's checksum and commit timestamp
    ///   before closing it.
    /// - Close every batch, whether or not it ever got an id bound. A batch
    ///   whose append failed has no durable record; it closes with the start
    ///   position so the replay bound is unaffected.
    fn finalize(
        &self,
        mut chain: TransactionChain,
        attempt: CommitAttempt,
        event: &dyn CommitEvent,
    ) -> CommitResult<TransactionId> {
        let chain_length = chain.len() as u64;
        let succeeded = attempt.succeeded();

        for transaction in chain.iter_mut() {
            let commit_timestamp = transaction.batch().time_committed();
            let checksum = transaction.checksum().unwrap_or(0);
            let log_position = transaction
                .log_position()
                .unwrap_or_else(LogPosition::start);

            if succeeded {
                transaction
                    .commitment_mut()
                    .publish(checksum, commit_timestamp);
            }
            transaction.commitment_mut().mark_closed(
                chain_length,
                commit_timestamp,
                log_position,
                checksum,
            );
            if let Some(transaction_id) = transaction.transaction_id() {
                event.transaction_closed(transaction_id);
            }
        }

        attempt.into_result()
    }
}

impl<A: TransactionAppender, S: StorageEngine> TransactionCommitProcess
    for InternalTransactionCommitProcess<A, S>
{
    fn commit(
        &self,
        mut chain: TransactionChain,
        event: &dyn CommitEvent,
        mode: ApplicationMode,
    ) -> CommitResult<TransactionId> {
        let mut attempt = CommitAttempt::new();

        // Phase 1: append. On failure, close whatever got bound during the
        // partial chain append and propagate.
        match self.appender.append(&mut chain) {
            Ok(last_id) => {
                attempt.appended(last_id);
                event.append_completed(last_id);
            }
            Err(cause) => {
                attempt.failed(CommitError::append_failed(cause));
                return self.finalize(chain, attempt, event);
            }
        }

        // Phase 2: apply. The records are already durable; on failure they
        // stay in the log for recovery, and the close phase still runs.
        match self.storage.apply(&chain, mode) {
            Ok(()) => {
                if let Some(last_id) = attempt.last_appended {
                    event.apply_completed(last_id);
                }
            }
            Err(cause) => {
                attempt.failed(CommitError::apply_failed(cause));
            }
        }

        // Phase 3: close, publish on success.
        self.finalize(chain, attempt, event)
    }
}
