//! Commit pipeline
//!
//! Everything between "the execution layer built a command batch" and "the
//! transaction is durable, applied, and accounted for":
//!
//! - Data model: batches, chains, subjects (`batch`)
//! - Per-transaction promise of id bookkeeping (`commitment`)
//! - Orchestration: append, apply, unconditional close (`process`)
//! - Tracing seam (`events`) and the failure taxonomy (`errors`)

mod batch;
mod commitment;
mod errors;
mod events;
mod process;

pub use batch::{
    CommandBatch, EntityRef, StorageCommand, StoreVersion, Subject, TransactionChain,
    TransactionToApply, NO_LEASE,
};
pub use commitment::Commitment;
pub use errors::{CommitError, CommitErrorCode, CommitResult, Severity};
pub use events::{CommitEvent, NullCommitEvent};
pub use process::{InternalTransactionCommitProcess, TransactionCommitProcess};
