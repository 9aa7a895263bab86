//! Check pointer
//!
//! Bounds recovery cost: flushes the storage engine, then durably records
//! "everything up to transaction N at log position P is accounted for" in the
//! checkpoint log. Only after the record is durable does
//! `last_check_pointed_transaction_id` advance.
//!
//! Checkpointing is single-writer by construction: an internal
//! mutex-and-condvar exclusion admits one checkpoint at a time, and
//! concurrent requesters either wait for the running one's result, give up
//! on a timeout predicate, or return immediately. Commits are never blocked;
//! the only synchronization with the commit path is reading the id store's
//! closed high-water mark.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::errors::{CheckpointError, CheckpointResult};
use super::log::{CheckpointLog, CheckpointRecord};
use super::threshold::{CheckPointThreshold, CheckpointConfig};
use crate::crash_point::{maybe_crash, points};
use crate::observability::Logger;
use crate::storage::StorageEngine;
use crate::txid::{TransactionId, TransactionIdStore};

/// How long a waiting requester sleeps between checks of its timeout
/// predicate.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Outcome of a checkpoint request that is allowed to decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// A checkpoint was written (by this caller or an observed concurrent
    /// one), accounting for the given transaction id.
    Performed(TransactionId),
    /// The threshold policy said no checkpoint is needed.
    Skipped,
    /// A checkpoint was already in progress and the caller chose not to wait.
    Busy,
    /// The caller waited for a running checkpoint and its timeout predicate
    /// fired first.
    TimedOut,
}

impl CheckpointOutcome {
    pub fn is_performed(&self) -> bool {
        matches!(self, CheckpointOutcome::Performed(_))
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            CheckpointOutcome::Performed(id) => Some(*id),
            _ => None,
        }
    }
}

/// State behind the checkpoint exclusion.
#[derive(Debug)]
struct PointerState {
    /// True while a checkpoint is writing. Set and cleared under the mutex.
    in_progress: bool,
    /// Incremented every time a checkpoint finishes (either way). Waiters
    /// key their waits on this so they observe the run they saw in flight.
    epoch: u64,
    /// Outcome of the most recently finished checkpoint, flattened for
    /// observation by waiters.
    last_result: Option<Result<TransactionId, String>>,
    /// Advances only after a checkpoint record is durable.
    last_check_pointed: TransactionId,
    /// When the last successful checkpoint finished.
    last_checkpoint_at: Instant,
}

/// Writes checkpoints, serializing against concurrent attempts.
pub struct CheckPointer<S: StorageEngine> {
    storage: Arc<S>,
    id_store: Arc<TransactionIdStore>,
    threshold: CheckPointThreshold,
    checkpoint_log: Mutex<CheckpointLog>,
    state: Mutex<PointerState>,
    finished: Condvar,
}

impl<S: StorageEngine> CheckPointer<S> {
    /// `last_check_pointed` is the id recovered from the checkpoint log at
    /// startup, or [`TransactionId::BASE`] for a fresh store.
    pub fn new(
        storage: Arc<S>,
        id_store: Arc<TransactionIdStore>,
        config: CheckpointConfig,
        checkpoint_log: CheckpointLog,
        last_check_pointed: TransactionId,
    ) -> Self {
        Self {
            storage,
            id_store,
            threshold: CheckPointThreshold::new(config),
            checkpoint_log: Mutex::new(checkpoint_log),
            state: Mutex::new(PointerState {
                in_progress: false,
                epoch: 0,
                last_result: None,
                last_check_pointed,
                last_checkpoint_at: Instant::now(),
            }),
            finished: Condvar::new(),
        }
    }

    /// Id the last checkpoint was made at, [`TransactionId::BASE`] if none.
    pub fn last_check_pointed_transaction_id(&self) -> TransactionId {
        self.state
            .lock()
            .expect("checkpoint state poisoned")
            .last_check_pointed
    }

    /// Writes a checkpoint if the threshold policy approves, otherwise
    /// returns [`CheckpointOutcome::Skipped`]. Also skips when another
    /// checkpoint is already running - the volume it covers includes ours.
    pub fn check_point_if_needed(&self, trigger: &str) -> CheckpointResult<CheckpointOutcome> {
        {
            let state = self.state.lock().expect("checkpoint state poisoned");
            if state.in_progress {
                return Ok(CheckpointOutcome::Skipped);
            }
            let last_closed = self.id_store.last_closed_transaction_id();
            let since = last_closed
                .value()
                .saturating_sub(state.last_check_pointed.value());
            if !self
                .threshold
                .is_reached(since, state.last_checkpoint_at.elapsed())
            {
                return Ok(CheckpointOutcome::Skipped);
            }
        }
        // Threshold approved; race for the exclusion like anyone else.
        self.try_check_point(trigger).map(CheckpointOutcome::Performed)
    }

    /// Writes a checkpoint, or - if one is already in progress - waits for it
    /// and returns its result instead of starting a second.
    pub fn try_check_point(&self, trigger: &str) -> CheckpointResult<TransactionId> {
        let mut state = self.state.lock().expect("checkpoint state poisoned");
        loop {
            if !state.in_progress {
                state.in_progress = true;
                drop(state);
                return self.perform(trigger);
            }
            let awaited_epoch = state.epoch;
            while state.in_progress && state.epoch == awaited_epoch {
                state = self
                    .finished
                    .wait(state)
                    .expect("checkpoint state poisoned");
            }
            if state.epoch != awaited_epoch {
                return Self::observe(&state);
            }
            // Spurious wakeup with nothing finished: re-evaluate.
        }
    }

    /// As [`try_check_point`](Self::try_check_point), but gives up waiting
    /// once `timed_out` returns true, yielding
    /// [`CheckpointOutcome::TimedOut`].
    pub fn try_check_point_with_timeout(
        &self,
        trigger: &str,
        mut timed_out: impl FnMut() -> bool,
    ) -> CheckpointResult<CheckpointOutcome> {
        let mut state = self.state.lock().expect("checkpoint state poisoned");
        loop {
            if !state.in_progress {
                state.in_progress = true;
                drop(state);
                return self.perform(trigger).map(CheckpointOutcome::Performed);
            }
            let awaited_epoch = state.epoch;
            while state.in_progress && state.epoch == awaited_epoch {
                if timed_out() {
                    return Ok(CheckpointOutcome::TimedOut);
                }
                let (guard, _) = self
                    .finished
                    .wait_timeout(state, WAIT_SLICE)
                    .expect("checkpoint state poisoned");
                state = guard;
            }
            if state.epoch != awaited_epoch {
                return Self::observe(&state).map(CheckpointOutcome::Performed);
            }
        }
    }

    /// Never blocks: writes a checkpoint if idle, otherwise reports
    /// [`CheckpointOutcome::Busy`].
    pub fn try_check_point_no_wait(&self, trigger: &str) -> CheckpointResult<CheckpointOutcome> {
        {
            let mut state = self.state.lock().expect("checkpoint state poisoned");
            if state.in_progress {
                return Ok(CheckpointOutcome::Busy);
            }
            state.in_progress = true;
        }
        self.perform(trigger).map(CheckpointOutcome::Performed)
    }

    /// Always writes a checkpoint of its own, bypassing the threshold policy
    /// but still respecting the exclusion: if one is running, wait for it to
    /// finish, then write a fresh one. Used for orderly shutdown.
    pub fn force_check_point(&self, trigger: &str) -> CheckpointResult<TransactionId> {
        let mut state = self.state.lock().expect("checkpoint state poisoned");
        while state.in_progress {
            state = self
                .finished
                .wait(state)
                .expect("checkpoint state poisoned");
        }
        state.in_progress = true;
        drop(state);
        self.perform(trigger)
    }

    /// Maps a finished run's flattened result back to the caller.
    fn observe(state: &PointerState) -> CheckpointResult<TransactionId> {
        match &state.last_result {
            Some(Ok(transaction_id)) => Ok(*transaction_id),
            Some(Err(message)) => Err(CheckpointError::failed(message.clone())),
            // An epoch bump always records a result first.
            None => Err(CheckpointError::failed(
                "observed checkpoint finished without a result",
            )),
        }
    }

    /// Runs one checkpoint while holding the exclusion, then releases it and
    /// wakes waiters. Every exit path releases.
    fn perform(&self, trigger: &str) -> CheckpointResult<TransactionId> {
        let result = self.write_check_point(trigger);

        let mut state = self.state.lock().expect("checkpoint state poisoned");
        state.in_progress = false;
        state.epoch += 1;
        match &result {
            Ok(transaction_id) => {
                state.last_check_pointed = *transaction_id;
                state.last_checkpoint_at = Instant::now();
                state.last_result = Some(Ok(*transaction_id));
            }
            Err(error) => {
                state.last_result = Some(Err(error.message().to_string()));
            }
        }
        drop(state);
        self.finished.notify_all();
        result
    }

    /// The checkpoint write itself. Reads the closed high-water mark first,
    /// then flushes storage (which by then covers at least that mark), then
    /// appends the durable record. Never references an id whose apply has
    /// not closed.
    fn write_check_point(&self, trigger: &str) -> CheckpointResult<TransactionId> {
        let (transaction_id, log_position) = self.id_store.last_closed_transaction();

        self.storage.flush().map_err(|e| {
            CheckpointError::failed(format!("Storage flush failed: {}", e))
        })?;

        maybe_crash(points::CHECKPOINT_BEFORE_RECORD);
        let record = CheckpointRecord::new(transaction_id, log_position, trigger);
        self.checkpoint_log
            .lock()
            .expect("checkpoint log poisoned")
            .append(&record)?;
        maybe_crash(points::CHECKPOINT_AFTER_RECORD);

        Logger::info(
            "CHECKPOINT_COMPLETE",
            &[
                ("tx_id", &transaction_id.to_string()),
                ("log_position", &log_position.to_string()),
                ("trigger", trigger),
            ],
        );
        Ok(transaction_id)
    }
}

impl<S: StorageEngine> std::fmt::Debug for CheckPointer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckPointer")
            .field("last_check_pointed", &self.last_check_pointed_transaction_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::GraphStore;
    use crate::txlog::LogPosition;
    use tempfile::TempDir;

    fn pointer(
        temp_dir: &TempDir,
        config: CheckpointConfig,
    ) -> (CheckPointer<GraphStore>, Arc<TransactionIdStore>) {
        let id_store = Arc::new(TransactionIdStore::new());
        let checkpoint_log = CheckpointLog::open(temp_dir.path()).unwrap();
        (
            CheckPointer::new(
                Arc::new(GraphStore::new()),
                Arc::clone(&id_store),
                config,
                checkpoint_log,
                TransactionId::BASE,
            ),
            id_store,
        )
    }

    fn close_transactions(id_store: &TransactionIdStore, count: u64) {
        for _ in 0..count {
            let id = id_store.next_id();
            id_store.transaction_closed(id, 1, 10, LogPosition::new(id.value() * 100), 0);
        }
    }

    fn eager_config() -> CheckpointConfig {
        CheckpointConfig {
            transaction_count_threshold: 1,
            interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_starts_at_base() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, _) = pointer(&temp_dir, CheckpointConfig::default());
        assert_eq!(
            pointer.last_check_pointed_transaction_id(),
            TransactionId::BASE
        );
    }

    #[test]
    fn test_force_references_closed_high_water() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, CheckpointConfig::default());
        close_transactions(&id_store, 5);

        let checkpointed = pointer.force_check_point("test").unwrap();
        assert_eq!(checkpointed, TransactionId::new(5));
        assert_eq!(
            pointer.last_check_pointed_transaction_id(),
            TransactionId::new(5)
        );

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), TransactionId::new(5));
        assert_eq!(latest.position(), LogPosition::new(500));
        assert_eq!(latest.trigger, "test");
    }

    #[test]
    fn test_if_needed_skips_below_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(
            &temp_dir,
            CheckpointConfig {
                transaction_count_threshold: 100,
                interval: Duration::from_secs(3600),
            },
        );
        close_transactions(&id_store, 5);

        let outcome = pointer.check_point_if_needed("threshold test").unwrap();
        assert_eq!(outcome, CheckpointOutcome::Skipped);
        assert_eq!(
            pointer.last_check_pointed_transaction_id(),
            TransactionId::BASE
        );
    }

    #[test]
    fn test_if_needed_performs_at_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, eager_config());
        close_transactions(&id_store, 3);

        let outcome = pointer.check_point_if_needed("threshold test").unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Performed(TransactionId::new(3))
        );
    }

    #[test]
    fn test_if_needed_is_noop_right_after_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, eager_config());
        close_transactions(&id_store, 3);

        pointer.force_check_point("first").unwrap();
        // Nothing closed since: policy must decline.
        let outcome = pointer.check_point_if_needed("second").unwrap();
        assert_eq!(outcome, CheckpointOutcome::Skipped);
    }

    #[test]
    fn test_try_check_point_when_idle_performs() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, CheckpointConfig::default());
        close_transactions(&id_store, 2);

        let checkpointed = pointer.try_check_point("idle").unwrap();
        assert_eq!(checkpointed, TransactionId::new(2));
    }

    #[test]
    fn test_no_wait_when_idle_performs() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, CheckpointConfig::default());
        close_transactions(&id_store, 2);

        let outcome = pointer.try_check_point_no_wait("no wait").unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Performed(TransactionId::new(2))
        );
    }

    #[test]
    fn test_timeout_predicate_not_consulted_when_idle() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, CheckpointConfig::default());
        close_transactions(&id_store, 1);

        // Timeouts apply only to waiting, never to the write itself.
        let outcome = pointer
            .try_check_point_with_timeout("timeout", || true)
            .unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Performed(TransactionId::new(1))
        );
    }

    #[test]
    fn test_checkpoint_of_empty_store_references_base() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, _) = pointer(&temp_dir, CheckpointConfig::default());

        let checkpointed = pointer.force_check_point("empty").unwrap();
        assert_eq!(checkpointed, TransactionId::BASE);
    }

    #[test]
    fn test_consecutive_checkpoints_advance_monotonically() {
        let temp_dir = TempDir::new().unwrap();
        let (pointer, id_store) = pointer(&temp_dir, CheckpointConfig::default());

        close_transactions(&id_store, 2);
        let first = pointer.force_check_point("one").unwrap();
        close_transactions(&id_store, 3);
        let second = pointer.force_check_point("two").unwrap();

        assert_eq!(first, TransactionId::new(2));
        assert_eq!(second, TransactionId::new(5));

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), second);
    }
}
