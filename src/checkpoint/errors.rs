//! Checkpoint error types
//!
//! Error codes:
//! - PLEX_CHECKPOINT_IO_FAILED (ERROR severity)
//!
//! A checkpoint failure is surfaced to the caller with checkpoint state
//! unchanged: `last_check_pointed_transaction_id` does not advance, and the
//! next attempt may retry. Checkpoint failure never corrupts serving state.

use std::fmt;
use std::io;

/// Severity levels for checkpoint errors.
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

/// Checkpoint-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorCode {
    /// I/O fault while flushing storage or writing the checkpoint record.
    PlexCheckpointIoFailed,
}

impl CheckpointErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            CheckpointErrorCode::PlexCheckpointIoFailed => "PLEX_CHECKPOINT_IO_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for CheckpointErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Checkpoint error with message and optional I/O cause.
#[derive(Debug)]
pub struct CheckpointError {
    code: CheckpointErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl CheckpointError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: CheckpointErrorCode::PlexCheckpointIoFailed,
            message: message.into(),
            source: None,
        }
    }

    pub fn io_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: CheckpointErrorCode::PlexCheckpointIoFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> CheckpointErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_errors_are_retryable() {
        assert!(!CheckpointError::failed("flush failed").is_fatal());
        assert!(!CheckpointError::io_failed(
            "record write failed",
            io::Error::new(io::ErrorKind::Other, "disk")
        )
        .is_fatal());
    }

    #[test]
    fn test_display_contains_code() {
        let display = format!("{}", CheckpointError::failed("x"));
        assert!(display.contains("PLEX_CHECKPOINT_IO_FAILED"));
        assert!(display.contains("ERROR"));
    }

    #[test]
    fn test_source_preserved() {
        use std::error::Error;
        let err = CheckpointError::io_failed("w", io::Error::new(io::ErrorKind::Other, "root"));
        assert!(err.source().unwrap().to_string().contains("root"));
    }
}
