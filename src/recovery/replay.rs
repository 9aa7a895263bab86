//! Log replay
//!
//! The replay loop regroups consecutive records into chains using the
//! first/last flags, applies each complete chain in `Recovery` mode, and
//! finishes by resetting the id store to the highest durable transaction.
//!
//! A transaction is committed only when the record carrying its last-batch
//! flag is durable; a chain cut off before that point is torn and the log is
//! truncated back to the chain's first record.

use std::path::Path;
use std::sync::Arc;

use super::errors::{RecoveryError, RecoveryResult};
use crate::checkpoint::CheckpointLog;
use crate::commit::{TransactionChain, TransactionToApply};
use crate::crash_point::{maybe_crash, points};
use crate::observability::Logger;
use crate::storage::{ApplicationMode, StorageEngine};
use crate::txid::{TransactionId, TransactionIdStore};
use crate::txlog::{log_path, LogPosition, LogReader, LogWriter, LoggedTransaction};

/// What recovery found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Replay bound taken from the latest checkpoint.
    pub checkpointed_transaction_id: TransactionId,
    /// Complete transactions re-applied from the log.
    pub transactions_replayed: u64,
    /// Highest durable transaction id after recovery.
    pub last_transaction_id: TransactionId,
    /// End of the valid log after recovery.
    pub recovered_position: LogPosition,
    /// True when a torn tail (or torn chain) was truncated away.
    pub truncated_torn_tail: bool,
}

/// Replays the transaction log against a storage engine.
pub struct RecoveryManager<S: StorageEngine> {
    storage: Arc<S>,
    id_store: Arc<TransactionIdStore>,
}

impl<S: StorageEngine> RecoveryManager<S> {
    pub fn new(storage: Arc<S>, id_store: Arc<TransactionIdStore>) -> Self {
        Self { storage, id_store }
    }

    /// Runs recovery for a data directory: find the latest checkpoint,
    /// replay everything after it, truncate a torn tail if one exists, and
    /// reset the id store.
    pub fn recover(&self, data_dir: &Path) -> RecoveryResult<RecoveryOutcome> {
        maybe_crash(points::RECOVERY_START);

        let checkpoint = CheckpointLog::find_latest(data_dir)
            .map_err(|e| RecoveryError::failed(format!("Checkpoint log unreadable: {}", e)))?;
        let (checkpointed_id, start_position) = match &checkpoint {
            Some(record) => (record.transaction_id(), record.position()),
            None => (TransactionId::BASE, LogPosition::start()),
        };

        if !log_path(data_dir).exists() {
            if start_position > LogPosition::start() {
                return Err(RecoveryError::failed(
                    "Checkpoint references a transaction log that does not exist",
                ));
            }
            // Fresh store: nothing to replay, nothing to reset.
            return Ok(RecoveryOutcome {
                checkpointed_transaction_id: checkpointed_id,
                transactions_replayed: 0,
                last_transaction_id: TransactionId::BASE,
                recovered_position: LogPosition::start(),
                truncated_torn_tail: false,
            });
        }

        let mut reader = LogReader::open_from_data_dir(data_dir)
            .map_err(|e| RecoveryError::failed(format!("Transaction log unreadable: {}", e)))?;
        reader
            .seek_to(start_position)
            .map_err(|e| RecoveryError::failed(format!("Checkpoint position invalid: {}", e)))?;

        let mut replayed = 0u64;
        let mut last_id = checkpointed_id;
        let mut last_checksum = 0u32;
        let mut last_timestamp = 0u64;
        let mut valid_end = start_position;
        let mut truncate_at: Option<LogPosition> = None;

        // Records of the chain currently being regrouped, plus where its
        // first record starts (the truncation point if it turns out torn).
        let mut pending: Vec<LoggedTransaction> = Vec::new();
        let mut pending_start = start_position;

        loop {
            match reader.read_next() {
                Ok(Some(logged)) => {
                    if pending.is_empty() {
                        pending_start = logged.start_position;
                    }
                    let is_last = logged.record.batch.is_last();
                    pending.push(logged);

                    if is_last {
                        let chain_end = pending
                            .last()
                            .map(|l| l.end_position)
                            .unwrap_or(valid_end);
                        let (chain_last_id, chain_checksum, chain_timestamp) =
                            self.replay_chain(std::mem::take(&mut pending))?;
                        replayed += 1;
                        last_id = chain_last_id;
                        last_checksum = chain_checksum;
                        last_timestamp = chain_timestamp;
                        valid_end = chain_end;
                    }
                }
                Ok(None) => {
                    if !pending.is_empty() {
                        // Chain cut off at a clean record boundary: the
                        // last-batch record never made it. Torn.
                        truncate_at = Some(pending_start);
                    }
                    break;
                }
                Err(e) if e.is_torn_tail() => {
                    truncate_at = Some(if pending.is_empty() {
                        reader.current_position()
                    } else {
                        pending_start
                    });
                    break;
                }
                Err(e) => {
                    return Err(RecoveryError::failed(format!(
                        "Transaction log damaged: {}",
                        e
                    )));
                }
            }
        }

        let truncated = truncate_at.is_some();
        if let Some(position) = truncate_at {
            let mut writer = LogWriter::open(data_dir).map_err(|e| {
                RecoveryError::failed(format!("Failed to open log for truncation: {}", e))
            })?;
            writer.truncate_to(position).map_err(|e| {
                RecoveryError::failed(format!("Failed to truncate torn tail: {}", e))
            })?;
            valid_end = position;
        }

        if last_id > TransactionId::BASE {
            self.id_store.set_last_committed_and_closed(
                last_id,
                last_checksum,
                last_timestamp,
                valid_end,
            );
        }

        maybe_crash(points::RECOVERY_AFTER_REPLAY);
        Logger::info(
            "RECOVERY_COMPLETE",
            &[
                ("checkpointed_tx_id", &checkpointed_id.to_string()),
                ("replayed", &replayed.to_string()),
                ("last_tx_id", &last_id.to_string()),
                ("truncated_torn_tail", if truncated { "true" } else { "false" }),
            ],
        );

        Ok(RecoveryOutcome {
            checkpointed_transaction_id: checkpointed_id,
            transactions_replayed: replayed,
            last_transaction_id: last_id,
            recovered_position: valid_end,
            truncated_torn_tail: truncated,
        })
    }

    /// Applies one complete chain, returning the last batch's id, checksum,
    /// and commit timestamp.
    fn replay_chain(
        &self,
        logged: Vec<LoggedTransaction>,
    ) -> RecoveryResult<(TransactionId, u32, u64)> {
        let last = match logged.last() {
            Some(last) => last,
            None => return Err(RecoveryError::failed("replay chain has no records")),
        };
        let last_id = last.record.transaction_id;
        let last_checksum = last.checksum;
        let last_timestamp = last.record.batch.time_committed();

        let transactions: Vec<TransactionToApply> = logged
            .into_iter()
            .map(|l| TransactionToApply::new(l.record.batch, Arc::clone(&self.id_store)))
            .collect();
        let chain = TransactionChain::new(transactions).map_err(|e| {
            RecoveryError::failed(format!(
                "Logged chain ending at transaction {} is malformed: {}",
                last_id, e
            ))
        })?;

        self.storage
            .apply(&chain, ApplicationMode::Recovery)
            .map_err(|e| RecoveryError::apply_failed(last_id.value(), e))?;

        Ok((last_id, last_checksum, last_timestamp))
    }
}
