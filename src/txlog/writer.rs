//! Transaction log writer with fsync enforcement
//!
//! The log is append-only, a single file, opened with exclusive write
//! access. No record is acknowledged until `sync` returns: the appender
//! writes every record of a chain, then syncs once, then lets commit
//! acknowledgment proceed.
//!
//! - Writes only move the logical end position forward
//! - fsync failure is fatal
//! - `truncate_to` exists solely for recovery to drop a torn tail

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{TxLogError, TxLogResult};
use crate::crash_point::{maybe_crash, points};

/// A byte offset into the transaction log file.
///
/// Positions are exclusive ends when used as replay bounds: a checkpoint
/// referencing position P means "everything before P is accounted for;
/// recovery resumes scanning at P".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition(u64);

impl LogPosition {
    /// The beginning of the log.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn offset(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Returns the transaction log path under a data directory.
pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("txlog").join("transactions.log")
}

/// Append-only transaction log writer.
pub struct LogWriter {
    log_path: PathBuf,
    file: File,
    /// Logical end of the log: where the next record starts.
    end_position: u64,
    /// Set when a write faulted partway: the on-disk tail is undefined and
    /// no further record may be placed after it until it is truncated away.
    tainted: bool,
}

impl LogWriter {
    /// Opens or creates `<data_dir>/txlog/transactions.log`, creating parent
    /// directories as needed. The end position is taken from the file length;
    /// validating that the tail is complete is recovery's job.
    pub fn open(data_dir: &Path) -> TxLogResult<Self> {
        let log_path = log_path(data_dir);
        let log_dir = log_path.parent().expect("log path has a parent");

        if !log_dir.exists() {
            fs::create_dir_all(log_dir).map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to create log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to open transaction log: {}", log_path.display()),
                    e,
                )
            })?;

        let end_position = file
            .metadata()
            .map_err(|e| TxLogError::append_failed("Failed to read log metadata", e))?
            .len();

        Ok(Self {
            log_path,
            file,
            end_position,
            tainted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// The logical end of the log: where the next record will start.
    pub fn position(&self) -> LogPosition {
        LogPosition(self.end_position)
    }

    /// Appends one serialized record, returning the position it starts at.
    ///
    /// The record is NOT durable until [`sync`](Self::sync) returns; callers
    /// must not acknowledge anything before that.
    pub fn append(&mut self, record: &[u8]) -> TxLogResult<LogPosition> {
        if self.tainted {
            return Err(TxLogError::append_failed(
                "Log tail is undefined after an earlier failed write; truncate before appending",
                io::Error::new(io::ErrorKind::Other, "tainted log writer"),
            ));
        }
        maybe_crash(points::TXLOG_BEFORE_WRITE);
        let start = self.end_position;
        if let Err(e) = self.file.write_all(record) {
            self.tainted = true;
            return Err(TxLogError::append_failed(
                format!("Failed to write log record at offset {}", start),
                e,
            ));
        }
        self.end_position += record.len() as u64;
        maybe_crash(points::TXLOG_AFTER_WRITE);
        Ok(LogPosition(start))
    }

    /// Forces everything appended so far to disk. Fatal on failure.
    pub fn sync(&self) -> TxLogResult<()> {
        maybe_crash(points::TXLOG_BEFORE_FSYNC);
        self.file.sync_all().map_err(|e| {
            TxLogError::fsync_failed("fsync failed after transaction log append", e)
        })?;
        maybe_crash(points::TXLOG_AFTER_FSYNC);
        Ok(())
    }

    /// Truncates the log to `position`, dropping a torn tail found by
    /// recovery. Everything at and after `position` is discarded; the file,
    /// then its directory, are fsynced.
    pub fn truncate_to(&mut self, position: LogPosition) -> TxLogResult<()> {
        if position.offset() > self.end_position {
            return Err(TxLogError::corruption_at_offset(
                position.offset(),
                "truncation target beyond end of log",
            ));
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to reopen log for truncation: {}", self.log_path.display()),
                    e,
                )
            })?;
        file.set_len(position.offset()).map_err(|e| {
            TxLogError::append_failed(
                format!("Failed to truncate log to offset {}", position.offset()),
                e,
            )
        })?;
        file.sync_all()
            .map_err(|e| TxLogError::fsync_failed("fsync failed after log truncation", e))?;

        let log_dir = self.log_path.parent().expect("log path has a parent");
        let dir = OpenOptions::new().read(true).open(log_dir).map_err(|e| {
            TxLogError::append_failed(
                format!("Failed to open log directory for fsync: {}", log_dir.display()),
                e,
            )
        })?;
        dir.sync_all()
            .map_err(|e| TxLogError::fsync_failed("fsync failed on log directory", e))?;

        // Reopen the append handle so its cursor agrees with the new length.
        self.file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                TxLogError::append_failed(
                    format!("Failed to reopen log after truncation: {}", self.log_path.display()),
                    e,
                )
            })?;
        self.end_position = position.offset();
        self.tainted = false;
        Ok(())
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("log_path", &self.log_path)
            .field("end_position", &self.end_position)
            .finish()
    }
}
