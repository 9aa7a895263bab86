//! TransactionId - totally ordered transaction identity
//!
//! - Totally orders all committed transactions
//! - Allocated in strictly increasing order, never reused
//! - Deterministic across crashes and recovery
//! - Independent of wall-clock time
//!
//! This is a PURE TYPE with no behavior beyond construction and access.

/// The base transaction id, meaning "nothing committed yet".
///
/// A fresh store reports this as its last committed and last closed id, and a
/// check pointer that has never written a checkpoint reports it as its last
/// check-pointed id. The first allocated transaction id is `BASE_TX_ID + 1`.
pub const BASE_TX_ID: u64 = 0;

/// A totally ordered, opaque transaction identity.
///
/// Every durably logged transaction has exactly one id. The ordering of ids
/// is the sole authority for log replay order and checkpoint bounds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// The base id as a typed value.
    pub const BASE: TransactionId = TransactionId(BASE_TX_ID);

    /// Creates a new TransactionId with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// This accessor exists for serialization and diagnostics only.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id immediately following this one.
    #[inline]
    pub fn next(&self) -> TransactionId {
        TransactionId(self.0 + 1)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
