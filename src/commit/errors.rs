//! Commit failure taxonomy
//!
//! Error codes:
//! - PLEX_COMMIT_APPEND_FAILED (ERROR severity)
//! - PLEX_COMMIT_APPLY_FAILED (ERROR severity)
//! - PLEX_COMMIT_INVALID_CHAIN (ERROR severity)
//!
//! Append and apply failures wrap the underlying cause with a phase-specific
//! message; the cause stays reachable through `std::error::Error::source` so
//! callers can inspect the root I/O or storage fault. A failed commit never
//! leaves id bookkeeping open - the close phase runs on every exit path.

use std::error::Error;
use std::fmt;

/// Severity levels for commit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The attempted commit fails, the database continues.
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

/// Commit-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitErrorCode {
    /// Durable log write failed; the transaction was not committed.
    PlexCommitAppendFailed,
    /// Storage engine rejected or faulted on already-logged commands; the
    /// record remains in the log for recovery to handle.
    PlexCommitApplyFailed,
    /// Chain construction violated the first/last flag contract.
    PlexCommitInvalidChain,
}

impl CommitErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            CommitErrorCode::PlexCommitAppendFailed => "PLEX_COMMIT_APPEND_FAILED",
            CommitErrorCode::PlexCommitApplyFailed => "PLEX_COMMIT_APPLY_FAILED",
            CommitErrorCode::PlexCommitInvalidChain => "PLEX_COMMIT_INVALID_CHAIN",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for CommitErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

type Cause = Box<dyn Error + Send + Sync + 'static>;

/// A failed commit attempt, tagged with the phase that failed.
#[derive(Debug)]
pub struct CommitError {
    code: CommitErrorCode,
    message: String,
    source: Option<Cause>,
}

impl CommitError {
    /// The append phase failed: the chain is not durably logged.
    pub fn append_failed(cause: impl Error + Send + Sync + 'static) -> Self {
        Self {
            code: CommitErrorCode::PlexCommitAppendFailed,
            message: format!("Could not append transaction: {}", cause),
            source: Some(Box::new(cause)),
        }
    }

    /// The apply phase failed: the chain is logged but storage rejected it.
    pub fn apply_failed(cause: impl Error + Send + Sync + 'static) -> Self {
        Self {
            code: CommitErrorCode::PlexCommitApplyFailed,
            message: format!("Could not apply the transaction: {}", cause),
            source: Some(Box::new(cause)),
        }
    }

    /// Chain assembly violated the first/last flag contract.
    pub fn invalid_chain(detail: impl Into<String>) -> Self {
        Self {
            code: CommitErrorCode::PlexCommitInvalidChain,
            message: format!("Invalid transaction chain: {}", detail.into()),
            source: None,
        }
    }

    pub fn code(&self) -> CommitErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure happened while appending: nothing reached the
    /// log, so recovery has nothing to do for this transaction.
    pub fn is_append_failure(&self) -> bool {
        self.code == CommitErrorCode::PlexCommitAppendFailed
    }

    /// True when the failure happened while applying: the record is durable
    /// and recovery is responsible for it.
    pub fn is_apply_failure(&self) -> bool {
        self.code == CommitErrorCode::PlexCommitApplyFailed
    }
}

impl fmt::Display for CommitError {
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

impl Error for CommitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Result type for commit operations.
pub type CommitResult<T> = Result<T, CommitError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_append_failure_message_and_code() {
        let root = io::Error::new(io::ErrorKind::Other, "disk error");
        let err = CommitError::append_failed(root);
        assert!(err.message().contains("Could not append transaction"));
        assert_eq!(err.code().code(), "PLEX_COMMIT_APPEND_FAILED");
        assert!(err.is_append_failure());
        assert!(!err.is_apply_failure());
    }

    #[test]
    fn test_apply_failure_message_and_code() {
        let root = io::Error::new(io::ErrorKind::Other, "constraint violated");
        let err = CommitError::apply_failed(root);
        assert!(err.message().contains("Could not apply the transaction"));
        assert!(err.is_apply_failure());
    }

    #[test]
    fn test_cause_is_preserved() {
        let root = io::Error::new(io::ErrorKind::Other, "mock failure");
        let err = CommitError::append_failed(root);

        let source = err.source().expect("cause must be preserved");
        assert!(source.to_string().contains("mock failure"));
    }

    #[test]
    fn test_display_contains_severity_and_code() {
        let err = CommitError::invalid_chain("chain has no batches");
        let display = format!("{}", err);
        assert!(display.contains("ERROR"));
        assert!(display.contains("PLEX_COMMIT_INVALID_CHAIN"));
        assert!(display.contains("chain has no batches"));
    }
}
