//! Checkpoint log
//!
//! A separate append-only log of checkpoint records, one JSON object per
//! line. Each record references a transaction id and the transaction log
//! position that id corresponds to; recovery replays the transaction log
//! from the position of the latest record.
//!
//! Location: `<data_dir>/txlog/checkpoints.log`
//!
//! Crash behavior: a record is only trusted once its line is complete and
//! parseable. A torn final line (crash mid-append) is ignored and the
//! previous record wins; the transaction log behind it is still intact, so
//! recovery merely replays a little more.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{CheckpointError, CheckpointResult};
use crate::txid::TransactionId;
use crate::txlog::LogPosition;

/// Returns the checkpoint log path under a data directory.
pub fn checkpoint_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("txlog").join("checkpoints.log")
}

/// One durable checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Highest closed transaction id this checkpoint accounts for.
    pub transaction_id: u64,
    /// Transaction log offset replay resumes at.
    pub log_position: u64,
    /// Why this checkpoint was triggered. Diagnostics only.
    pub trigger: String,
    /// RFC3339 timestamp of the write.
    pub created_at: String,
    /// Record format version.
    pub format_version: u8,
}

impl CheckpointRecord {
    pub fn new(transaction_id: TransactionId, log_position: LogPosition, trigger: &str) -> Self {
        Self {
            transaction_id: transaction_id.value(),
            log_position: log_position.offset(),
            trigger: trigger.to_string(),
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            format_version: 1,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::new(self.transaction_id)
    }

    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.log_position)
    }
}

/// Append-only checkpoint log writer.
#[derive(Debug)]
pub struct CheckpointLog {
    log_path: PathBuf,
    file: File,
}

impl CheckpointLog {
    /// Opens or creates `<data_dir>/txlog/checkpoints.log`.
    pub fn open(data_dir: &Path) -> CheckpointResult<Self> {
        let log_path = checkpoint_log_path(data_dir);
        let log_dir = log_path.parent().expect("checkpoint log path has a parent");

        if !log_dir.exists() {
            fs::create_dir_all(log_dir).map_err(|e| {
                CheckpointError::io_failed(
                    format!("Failed to create checkpoint log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                CheckpointError::io_failed(
                    format!("Failed to open checkpoint log: {}", log_path.display()),
                    e,
                )
            })?;

        Ok(Self { log_path, file })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Appends one record durably: line write, file fsync, directory fsync.
    /// Only after this returns may checkpoint state advance.
    pub fn append(&mut self, record: &CheckpointRecord) -> CheckpointResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| {
            CheckpointError::failed(format!("Failed to serialize checkpoint record: {}", e))
        })?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).map_err(|e| {
            CheckpointError::io_failed(
                format!("Failed to write checkpoint record: {}", self.log_path.display()),
                e,
            )
        })?;
        self.file.sync_all().map_err(|e| {
            CheckpointError::io_failed("Failed to fsync checkpoint log", e)
        })?;

        let log_dir = self.log_path.parent().expect("checkpoint log path has a parent");
        let dir = OpenOptions::new().read(true).open(log_dir).map_err(|e| {
            CheckpointError::io_failed(
                format!("Failed to open checkpoint log directory: {}", log_dir.display()),
                e,
            )
        })?;
        dir.sync_all().map_err(|e| {
            CheckpointError::io_failed("Failed to fsync checkpoint log directory", e)
        })?;

        Ok(())
    }

    /// Returns the latest durable checkpoint record, or `None` for a fresh
    /// store. A torn or otherwise unparseable final line is skipped; damage
    /// before the final line is an error.
    pub fn find_latest(data_dir: &Path) -> CheckpointResult<Option<CheckpointRecord>> {
        let log_path = checkpoint_log_path(data_dir);
        if !log_path.exists() {
            return Ok(None);
        }

        let file = File::open(&log_path).map_err(|e| {
            CheckpointError::io_failed(
                format!("Failed to open checkpoint log: {}", log_path.display()),
                e,
            )
        })?;

        let reader = BufReader::new(file);
        let lines: Vec<String> = reader
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| CheckpointError::io_failed("Failed to read checkpoint log", e))?;

        let mut latest = None;
        let last_index = lines.len().saturating_sub(1);
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointRecord>(line) {
                Ok(record) => latest = Some(record),
                // Torn final line: the crash hit mid-append. The previous
                // record stands.
                Err(_) if index == last_index => {}
                Err(e) => {
                    return Err(CheckpointError::failed(format!(
                        "Corrupt checkpoint record on line {}: {}",
                        index + 1,
                        e
                    )));
                }
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: u64, position: u64) -> CheckpointRecord {
        CheckpointRecord::new(
            TransactionId::new(id),
            LogPosition::new(position),
            "test",
        )
    }

    #[test]
    fn test_fresh_store_has_no_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        assert!(CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_append_then_find_latest() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = CheckpointLog::open(temp_dir.path()).unwrap();
        log.append(&record(5, 640)).unwrap();

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), TransactionId::new(5));
        assert_eq!(latest.position(), LogPosition::new(640));
        assert_eq!(latest.trigger, "test");
        assert_eq!(latest.format_version, 1);
    }

    #[test]
    fn test_latest_record_wins() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = CheckpointLog::open(temp_dir.path()).unwrap();
        log.append(&record(5, 640)).unwrap();
        log.append(&record(9, 1280)).unwrap();

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), TransactionId::new(9));
    }

    #[test]
    fn test_torn_final_line_falls_back_to_previous() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = CheckpointLog::open(temp_dir.path()).unwrap();
        log.append(&record(5, 640)).unwrap();

        // Simulate a crash mid-append of the next record.
        let mut file = OpenOptions::new()
            .append(true)
            .open(checkpoint_log_path(temp_dir.path()))
            .unwrap();
        file.write_all(b"{\"transaction_id\":9,\"log_po").unwrap();

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), TransactionId::new(5));
    }

    #[test]
    fn test_corruption_before_final_line_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = checkpoint_log_path(temp_dir.path());
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, "garbage\n{\"also\":\"garbage\"}\n").unwrap();

        // The garbage is not on the final line only; both lines are bad but
        // the first already fails hard.
        assert!(CheckpointLog::find_latest(temp_dir.path()).is_err());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut log = CheckpointLog::open(temp_dir.path()).unwrap();
            log.append(&record(3, 320)).unwrap();
        }
        {
            let mut log = CheckpointLog::open(temp_dir.path()).unwrap();
            log.append(&record(7, 960)).unwrap();
        }

        let latest = CheckpointLog::find_latest(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id(), TransactionId::new(7));
    }
}
