//! Transaction log subsystem
//!
//! The log is the authoritative durability mechanism: no transaction is
//! acknowledged until its records are fully persisted here.
//!
//! # Invariants Enforced
//!
//! - fsync before acknowledgment
//! - A record is appended before its effects reach storage
//! - Log record order equals append-call order equals id order
//! - Checksums on every record; halt on mid-log corruption
//! - A torn tail (crash mid-append) is truncatable to the last complete
//!   record, never replayed partially

mod appender;
mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use appender::{LogTransactionAppender, TransactionAppender};
pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{Severity, TxLogError, TxLogErrorCode, TxLogResult};
pub use reader::{LogReader, LoggedTransaction};
pub use record::{TransactionLogRecord, MIN_RECORD_SIZE, RECORD_TYPE_TRANSACTION};
pub use writer::{log_path, LogPosition, LogWriter};
