//! Transaction id store - allocation counter and closed-id bookkeeping
//!
//! The id store is the shared authority for transaction identity:
//!
//! - Ids are allocated from an atomic counter, strictly increasing, never
//!   reused.
//! - Every allocated id is eventually reported closed exactly once, whether
//!   its apply succeeded or failed.
//! - The closed-id high-water mark is the highest id N such that all ids
//!   `<= N` are closed. Recovery and checkpoint bounds depend on it.
//!
//! Closes may arrive out of order (concurrent committers finish in any
//! order); the tracker parks out-of-order closes and advances the high-water
//! mark only over gap-free prefixes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::transaction_id::{TransactionId, BASE_TX_ID};
use crate::txlog::LogPosition;

/// Bookkeeping recorded when a transaction closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClosedEntry {
    chain_length: u64,
    commit_timestamp: u64,
    log_position: LogPosition,
    checksum: u32,
}

/// Diagnostics snapshot of the closed high-water transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedTransactionMetadata {
    pub transaction_id: TransactionId,
    pub chain_length: u64,
    pub commit_timestamp: u64,
    pub log_position: LogPosition,
    pub checksum: u32,
}

/// Gap-free closed-id tracker.
#[derive(Debug)]
struct ClosedTracker {
    /// Highest id such that all ids <= it are closed.
    high_water: u64,
    /// Close bookkeeping of the high-water transaction.
    high_water_entry: ClosedEntry,
    /// Closed ids above the high-water mark, waiting for the gap to fill.
    parked: BTreeMap<u64, ClosedEntry>,
}

impl ClosedTracker {
    fn close(&mut self, id: u64, entry: ClosedEntry) {
        debug_assert!(
            id > self.high_water && !self.parked.contains_key(&id),
            "transaction {} closed twice",
            id
        );
        if id <= self.high_water || self.parked.contains_key(&id) {
            return;
        }
        self.parked.insert(id, entry);
        while let Some(mut entry) = self.parked.remove(&(self.high_water + 1)) {
            self.high_water += 1;
            // An id closed without a durable record (failed append) carries
            // no position; the replay bound must never move backwards.
            if entry.log_position < self.high_water_entry.log_position {
                entry.log_position = self.high_water_entry.log_position;
            }
            self.high_water_entry = entry;
        }
    }
}

/// Last-committed transaction metadata, published by commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedMetadata {
    pub transaction_id: TransactionId,
    pub checksum: u32,
    pub commit_timestamp: u64,
}

/// Shared store of transaction id state.
///
/// All methods take `&self`; the store is designed to sit behind an `Arc`
/// shared by the appender, the commit process, the check pointer, and
/// recovery.
#[derive(Debug)]
pub struct TransactionIdStore {
    /// Next id to hand out. Starts at `BASE_TX_ID + 1`.
    next_id: AtomicU64,
    closed: Mutex<ClosedTracker>,
    committed: Mutex<CommittedMetadata>,
}

impl TransactionIdStore {
    /// A store for a fresh database: nothing allocated, nothing closed.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(BASE_TX_ID + 1),
            closed: Mutex::new(ClosedTracker {
                high_water: BASE_TX_ID,
                high_water_entry: ClosedEntry {
                    chain_length: 0,
                    commit_timestamp: 0,
                    log_position: LogPosition::start(),
                    checksum: 0,
                },
                parked: BTreeMap::new(),
            }),
            committed: Mutex::new(CommittedMetadata {
                transaction_id: TransactionId::BASE,
                checksum: 0,
                commit_timestamp: 0,
            }),
        }
    }

    /// Allocates the next transaction id. Strictly increasing, never reused.
    pub fn next_id(&self) -> TransactionId {
        TransactionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// The id that the next call to [`next_id`](Self::next_id) would return.
    pub fn peek_next_id(&self) -> TransactionId {
        TransactionId::new(self.next_id.load(Ordering::SeqCst))
    }

    /// Reports a transaction as closed: its apply phase has completed,
    /// successfully or not.
    ///
    /// Must be called exactly once per allocated id. The high-water mark only
    /// advances over gap-free prefixes, so a slow concurrent committer holds
    /// the mark back until it too closes.
    pub fn transaction_closed(
        &self,
        transaction_id: TransactionId,
        chain_length: u64,
        commit_timestamp: u64,
        log_position: LogPosition,
        checksum: u32,
    ) {
        let entry = ClosedEntry {
            chain_length,
            commit_timestamp,
            log_position,
            checksum,
        };
        self.closed
            .lock()
            .expect("closed tracker poisoned")
            .close(transaction_id.value(), entry);
    }

    /// Publishes the final commit metadata of a successfully applied
    /// transaction. Monotonic: an older id never overwrites a newer one.
    pub fn transaction_committed(
        &self,
        transaction_id: TransactionId,
        checksum: u32,
        commit_timestamp: u64,
    ) {
        let mut committed = self.committed.lock().expect("committed metadata poisoned");
        if transaction_id > committed.transaction_id {
            *committed = CommittedMetadata {
                transaction_id,
                checksum,
                commit_timestamp,
            };
        }
    }

    /// Highest id such that all ids `<=` it are closed.
    pub fn last_closed_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.closed.lock().expect("closed tracker poisoned").high_water)
    }

    /// The closed high-water mark together with the log position of that
    /// transaction. This pair is what a checkpoint references.
    pub fn last_closed_transaction(&self) -> (TransactionId, LogPosition) {
        let tracker = self.closed.lock().expect("closed tracker poisoned");
        (
            TransactionId::new(tracker.high_water),
            tracker.high_water_entry.log_position,
        )
    }

    /// Full close bookkeeping of the high-water transaction.
    pub fn last_closed_transaction_metadata(&self) -> ClosedTransactionMetadata {
        let tracker = self.closed.lock().expect("closed tracker poisoned");
        ClosedTransactionMetadata {
            transaction_id: TransactionId::new(tracker.high_water),
            chain_length: tracker.high_water_entry.chain_length,
            commit_timestamp: tracker.high_water_entry.commit_timestamp,
            log_position: tracker.high_water_entry.log_position,
            checksum: tracker.high_water_entry.checksum,
        }
    }

    /// Metadata of the most recently committed (published) transaction.
    pub fn last_committed_transaction(&self) -> CommittedMetadata {
        *self.committed.lock().expect("committed metadata poisoned")
    }

    /// Id of the most recently committed (published) transaction.
    pub fn last_committed_transaction_id(&self) -> TransactionId {
        self.last_committed_transaction().transaction_id
    }

    /// Resets the store to a recovered state: `transaction_id` is the highest
    /// id found durable in the log; everything up to it is considered closed
    /// and committed. Used by recovery before the store accepts new commits.
    pub fn set_last_committed_and_closed(
        &self,
        transaction_id: TransactionId,
        checksum: u32,
        commit_timestamp: u64,
        log_position: LogPosition,
    ) {
        self.next_id
            .store(transaction_id.value() + 1, Ordering::SeqCst);
        {
            let mut tracker = self.closed.lock().expect("closed tracker poisoned");
            tracker.high_water = transaction_id.value();
            tracker.high_water_entry = ClosedEntry {
                chain_length: 1,
                commit_timestamp,
                log_position,
                checksum,
            };
            tracker.parked.clear();
        }
        {
            let mut committed = self.committed.lock().expect("committed metadata poisoned");
            *committed = CommittedMetadata {
                transaction_id,
                checksum,
                commit_timestamp,
            };
        }
    }
}

impl Default for TransactionIdStore {
    fn default() -> Self {
        Self::new()
    }
}
