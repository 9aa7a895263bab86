//! Transaction log reader for sequential replay
//!
//! Reads records strictly in log order, validating checksums and structure.
//! Damage is classified in exactly two ways:
//!
//! - An incomplete record at end of file is a torn tail: the crash interrupted
//!   an append. Reported as `PLEX_TXLOG_TORN_TAIL` with the offset of the last
//!   complete record, so recovery can truncate and continue.
//! - Anything else (checksum mismatch, invalid structure, non-monotonic ids)
//!   is corruption and halts replay. No skipping, no repair attempts.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::errors::{TxLogError, TxLogResult};
use super::record::{TransactionLogRecord, MIN_RECORD_SIZE};
use super::writer::{log_path, LogPosition};
use crate::txid::TransactionId;

/// One record read back from the log, with its placement.
#[derive(Debug, Clone)]
pub struct LoggedTransaction {
    pub record: TransactionLogRecord,
    /// Checksum embedded in the record, as the appender computed it.
    pub checksum: u32,
    /// Where the record starts.
    pub start_position: LogPosition,
    /// First byte after the record; replay resumes here.
    pub end_position: LogPosition,
}

/// Sequential transaction log reader.
pub struct LogReader {
    log_path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_transaction_id: Option<TransactionId>,
}

impl LogReader {
    pub fn open(path: &Path) -> TxLogResult<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                TxLogError::corruption(format!("Transaction log not found: {}", path.display()))
            } else {
                TxLogError::corruption(format!(
                    "Failed to open transaction log: {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| TxLogError::corruption(format!("Failed to read log metadata: {}", e)))?
            .len();

        Ok(Self {
            log_path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_transaction_id: None,
        })
    }

    /// Opens `<data_dir>/txlog/transactions.log`.
    pub fn open_from_data_dir(data_dir: &Path) -> TxLogResult<Self> {
        Self::open(&log_path(data_dir))
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Offset immediately after the last successfully read record.
    pub fn current_position(&self) -> LogPosition {
        LogPosition::new(self.current_offset)
    }

    /// Positions the reader at `position`, typically a checkpoint's replay
    /// bound. Resets the monotonicity check: ids after a seek only need to
    /// keep increasing among themselves.
    pub fn seek_to(&mut self, position: LogPosition) -> TxLogResult<()> {
        if position.offset() > self.file_size {
            return Err(TxLogError::corruption_at_offset(
                position.offset(),
                "seek target beyond end of log",
            ));
        }
        self.reader
            .seek(SeekFrom::Start(position.offset()))
            .map_err(|e| {
                TxLogError::corruption(format!("Failed to seek transaction log: {}", e))
            })?;
        self.current_offset = position.offset();
        self.last_transaction_id = None;
        Ok(())
    }

    /// Reads the next record.
    ///
    /// - `Ok(Some(..))` - a record was read and validated
    /// - `Ok(None)` - clean end of file
    /// - `Err(torn tail)` - incomplete record at end of file
    /// - `Err(corruption)` - anything else
    pub fn read_next(&mut self) -> TxLogResult<Option<LoggedTransaction>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let start = self.current_offset;
        let remaining = self.file_size - start;

        if remaining < 4 {
            return Err(TxLogError::torn_tail(
                start,
                format!("{} trailing bytes, too short for a record length", remaining),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            TxLogError::corruption_at_offset(start, format!("Failed to read record length: {}", e))
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 {
            return Err(TxLogError::corruption_at_offset(
                start,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if record_length > remaining {
            // The append that wrote this record never finished.
            return Err(TxLogError::torn_tail(
                start,
                format!(
                    "record claims {} bytes but only {} remain",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            TxLogError::corruption_at_offset(start, format!("Failed to read record body: {}", e))
        })?;

        let (record, checksum, consumed) = TransactionLogRecord::deserialize(&record_buf)
            .map_err(|e| TxLogError::corruption_at_offset(start, e.to_string()))?;
        debug_assert_eq!(consumed as u64, record_length);

        if let Some(last) = self.last_transaction_id {
            if record.transaction_id <= last {
                return Err(TxLogError::corruption_at_offset(
                    start,
                    format!(
                        "non-monotonic transaction id: {} after {}",
                        record.transaction_id, last
                    ),
                ));
            }
        }

        self.current_offset += record_length;
        self.last_transaction_id = Some(record.transaction_id);

        Ok(Some(LoggedTransaction {
            record,
            checksum,
            start_position: LogPosition::new(start),
            end_position: LogPosition::new(self.current_offset),
        }))
    }

    /// Reads every remaining record. Fails on the first damage encountered.
    pub fn read_all(&mut self) -> TxLogResult<Vec<LoggedTransaction>> {
        let mut records = Vec::new();
        while let Some(logged) = self.read_next()? {
            records.push(logged);
        }
        Ok(records)
    }
}
