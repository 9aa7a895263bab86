//! Transaction log error types
//!
//! Error codes:
//! - PLEX_TXLOG_APPEND_FAILED (ERROR severity)
//! - PLEX_TXLOG_FSYNC_FAILED (FATAL severity)
//! - PLEX_TXLOG_CORRUPTION (FATAL severity)
//! - PLEX_TXLOG_TORN_TAIL (ERROR severity)
//!
//! A torn tail is the one recoverable shape of log damage: an incomplete
//! record at end of file, left by a crash mid-append. It is reported with the
//! offset of the last complete record so recovery can truncate there.
//! Anything incomplete or mismatched before end of file is corruption.

use std::fmt;
use std::io;

/// Severity levels for transaction log errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the database continues.
    Error,
    /// The database must terminate.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Transaction-log-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLogErrorCode {
    /// Log write failed.
    PlexTxLogAppendFailed,
    /// Log fsync failed.
    PlexTxLogFsyncFailed,
    /// Checksum or structure failure before end of file.
    PlexTxLogCorruption,
    /// Incomplete record at end of file; truncatable.
    PlexTxLogTornTail,
}

impl TxLogErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            TxLogErrorCode::PlexTxLogAppendFailed => "PLEX_TXLOG_APPEND_FAILED",
            TxLogErrorCode::PlexTxLogFsyncFailed => "PLEX_TXLOG_FSYNC_FAILED",
            TxLogErrorCode::PlexTxLogCorruption => "PLEX_TXLOG_CORRUPTION",
            TxLogErrorCode::PlexTxLogTornTail => "PLEX_TXLOG_TORN_TAIL",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TxLogErrorCode::PlexTxLogAppendFailed => Severity::Error,
            TxLogErrorCode::PlexTxLogFsyncFailed => Severity::Fatal,
            TxLogErrorCode::PlexTxLogCorruption => Severity::Fatal,
            TxLogErrorCode::PlexTxLogTornTail => Severity::Error,
        }
    }
}

impl fmt::Display for TxLogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Transaction log error with code, context, and preserved cause.
#[derive(Debug)]
pub struct TxLogError {
    code: TxLogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TxLogError {
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::PlexTxLogAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::PlexTxLogFsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::PlexTxLogCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::PlexTxLogCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Incomplete record at end of file. `last_complete_offset` is where the
    /// log can be truncated to drop the torn bytes.
    pub fn torn_tail(last_complete_offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::PlexTxLogTornTail,
            message: reason.into(),
            details: Some(format!("last_complete_offset: {}", last_complete_offset)),
            source: None,
        }
    }

    pub fn code(&self) -> TxLogErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub fn is_torn_tail(&self) -> bool {
        self.code == TxLogErrorCode::PlexTxLogTornTail
    }
}

impl fmt::Display for TxLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for TxLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for transaction log operations.
pub type TxLogResult<T> = Result<T, TxLogError>;
