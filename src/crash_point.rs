//! Crash point injection for durability testing
//!
//! Enables process-kill injection via the `PLEXDB_CRASH_POINT` environment
//! variable. When a crash point is enabled, the process terminates through
//! `std::process::abort()` - no cleanup, no unwinding, no catching - so
//! recovery tests exercise the exact on-disk state a real crash leaves.
//!
//! ```bash
//! PLEXDB_CRASH_POINT=txlog_after_write cargo test --test recovery_replay
//! ```
//!
//! A no-op when the variable is not set or names a different point.

use std::sync::OnceLock;

/// Cache the crash point name to avoid repeated env var lookups.
static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn configured_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("PLEXDB_CRASH_POINT").ok())
        .as_deref()
}

/// True if `PLEXDB_CRASH_POINT` equals the given name.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    configured_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Aborts the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names.
pub mod points {
    pub const TXLOG_BEFORE_WRITE: &str = "txlog_before_write";
    pub const TXLOG_AFTER_WRITE: &str = "txlog_after_write";
    pub const TXLOG_BEFORE_FSYNC: &str = "txlog_before_fsync";
    pub const TXLOG_AFTER_FSYNC: &str = "txlog_after_fsync";

    pub const CHECKPOINT_BEFORE_RECORD: &str = "checkpoint_before_record";
    pub const CHECKPOINT_AFTER_RECORD: &str = "checkpoint_after_record";

    pub const RECOVERY_START: &str = "recovery_start";
    pub const RECOVERY_AFTER_REPLAY: &str = "recovery_after_replay";

    pub fn all() -> &'static [&'static str] {
        &[
            TXLOG_BEFORE_WRITE,
            TXLOG_AFTER_WRITE,
            TXLOG_BEFORE_FSYNC,
            TXLOG_AFTER_FSYNC,
            CHECKPOINT_BEFORE_RECORD,
            CHECKPOINT_AFTER_RECORD,
            RECOVERY_START,
            RECOVERY_AFTER_REPLAY,
        ]
    }
}
