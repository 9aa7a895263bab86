//! Transaction identity subsystem
//!
//! Ids are the backbone of the durability pipeline:
//!
//! - Allocated by the appender, in log order
//! - Appended to the log before being applied to storage
//! - Closed exactly once per allocation, regardless of append/apply outcome
//! - Checkpoints reference only the gap-free closed high-water mark

mod id_store;
mod transaction_id;

pub use id_store::{ClosedTransactionMetadata, CommittedMetadata, TransactionIdStore};
pub use transaction_id::{TransactionId, BASE_TX_ID};
