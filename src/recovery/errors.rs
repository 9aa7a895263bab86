//! Recovery error types
//!
//! Error codes:
//! - PLEX_RECOVERY_FAILED (FATAL severity)
//! - PLEX_RECOVERY_APPLY_FAILED (FATAL severity)
//!
//! Recovery failures halt startup. There is no partial recovery: either the
//! log replays cleanly (with at most a truncated torn tail) or the database
//! refuses to serve.

use std::fmt;

/// Recovery-specific error codes. All fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryErrorCode {
    /// The log or checkpoint log could not be read or was corrupt.
    PlexRecoveryFailed,
    /// A logged transaction failed to apply during replay. Operator
    /// intervention required; the record is never silently skipped.
    PlexRecoveryApplyFailed,
}

impl RecoveryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryErrorCode::PlexRecoveryFailed => "PLEX_RECOVERY_FAILED",
            RecoveryErrorCode::PlexRecoveryApplyFailed => "PLEX_RECOVERY_APPLY_FAILED",
        }
    }
}

impl fmt::Display for RecoveryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A failed recovery attempt.
#[derive(Debug)]
pub struct RecoveryError {
    code: RecoveryErrorCode,
    message: String,
}

impl RecoveryError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: RecoveryErrorCode::PlexRecoveryFailed,
            message: message.into(),
        }
    }

    /// Replay of transaction `transaction_id` was rejected by storage.
    pub fn apply_failed(transaction_id: u64, cause: impl fmt::Display) -> Self {
        Self {
            code: RecoveryErrorCode::PlexRecoveryApplyFailed,
            message: format!(
                "Replay of transaction {} failed to apply: {}",
                transaction_id, cause
            ),
        }
    }

    pub fn code(&self) -> RecoveryErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FATAL] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for RecoveryError {}

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;
