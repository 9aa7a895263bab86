//! Command batches and transaction chains
//!
//! A `CommandBatch` is the replayable description of one transaction (or one
//! part of a split transaction): an ordered sequence of storage commands plus
//! the metadata that goes into its log record header. Batches are immutable
//! once built.
//!
//! A logical transaction too large for a single log record is split into a
//! chain of batches. The chain is an owned, ordered collection: exactly one
//! batch carries `is_first`, exactly one carries `is_last`, and a singleton
//! batch carries both.

use std::sync::Arc;

use super::commitment::Commitment;
use super::errors::{CommitError, CommitResult};
use crate::txid::{TransactionId, TransactionIdStore};
use crate::txlog::LogPosition;

/// Lease id carried by transactions that hold no cluster lease.
pub const NO_LEASE: i32 = -1;

/// Identity of the principal that originated a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// No authenticated principal.
    Anonymous,
    /// Internal work performed by the database itself.
    System,
    /// An authenticated end user.
    User(String),
}

impl Subject {
    /// Name used in log record headers and diagnostics.
    pub fn name(&self) -> &str {
        match self {
            Subject::Anonymous => "",
            Subject::System => "system",
            Subject::User(name) => name,
        }
    }
}

/// Store format version a batch's commands were produced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoreVersion(pub u8);

impl StoreVersion {
    /// The version this build writes.
    pub const CURRENT: StoreVersion = StoreVersion(1);
}

/// Reference to a storage entity a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Node(u64),
    Relationship(u64),
}

/// A single storage-level graph mutation.
///
/// Commands are the unit of replay: applying the same command sequence to the
/// same store state always produces the same result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCommand {
    CreateNode {
        node_id: u64,
        labels: Vec<String>,
    },
    DeleteNode {
        node_id: u64,
    },
    CreateRelationship {
        relationship_id: u64,
        start_node: u64,
        end_node: u64,
        relationship_type: String,
    },
    DeleteRelationship {
        relationship_id: u64,
    },
    SetProperty {
        entity: EntityRef,
        key: String,
        value: String,
    },
    RemoveProperty {
        entity: EntityRef,
        key: String,
    },
}

/// An ordered, replayable sequence of storage commands plus transaction
/// metadata. Immutable once built.
#[derive(Debug, Clone)]
pub struct CommandBatch {
    commands: Vec<StorageCommand>,
    additional_header: Vec<u8>,
    time_started: u64,
    time_committed: u64,
    latest_committed_tx_when_started: TransactionId,
    lease_id: i32,
    subject: Subject,
    version: StoreVersion,
    is_first: bool,
    is_last: bool,
}

impl CommandBatch {
    /// Builds a singleton batch: a whole transaction in one log record.
    ///
    /// An empty command sequence is a valid no-op transaction; it still
    /// consumes an id and a timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        commands: Vec<StorageCommand>,
        additional_header: Vec<u8>,
        time_started: u64,
        latest_committed_tx_when_started: TransactionId,
        time_committed: u64,
        lease_id: i32,
        subject: Subject,
    ) -> Self {
        debug_assert!(time_started <= time_committed);
        Self {
            commands,
            additional_header,
            time_started,
            time_committed,
            latest_committed_tx_when_started,
            lease_id,
            subject,
            version: StoreVersion::CURRENT,
            is_first: true,
            is_last: true,
        }
    }

    /// Re-tags this batch as one part of a multi-batch chain.
    pub fn with_chain_position(mut self, is_first: bool, is_last: bool) -> Self {
        self.is_first = is_first;
        self.is_last = is_last;
        self
    }

    /// Used by the log reader to reconstruct a batch with an explicit
    /// version, exactly as it was written.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_log_parts(
        commands: Vec<StorageCommand>,
        additional_header: Vec<u8>,
        time_started: u64,
        latest_committed_tx_when_started: TransactionId,
        time_committed: u64,
        lease_id: i32,
        subject: Subject,
        version: StoreVersion,
        is_first: bool,
        is_last: bool,
    ) -> Self {
        Self {
            commands,
            additional_header,
            time_started,
            time_committed,
            latest_committed_tx_when_started,
            lease_id,
            subject,
            version,
            is_first,
            is_last,
        }
    }

    pub fn commands(&self) -> &[StorageCommand] {
        &self.commands
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn additional_header(&self) -> &[u8] {
        &self.additional_header
    }

    pub fn time_started(&self) -> u64 {
        self.time_started
    }

    pub fn time_committed(&self) -> u64 {
        self.time_committed
    }

    pub fn latest_committed_tx_when_started(&self) -> TransactionId {
        self.latest_committed_tx_when_started
    }

    pub fn lease_id(&self) -> i32 {
        self.lease_id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn version(&self) -> StoreVersion {
        self.version
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }
}

/// Equality covers commands, header bytes, and the two timestamps; chain
/// position and other derived fields do not participate.
impl PartialEq for CommandBatch {
    fn eq(&self, other: &Self) -> bool {
        self.commands == other.commands
            && self.additional_header == other.additional_header
            && self.time_started == other.time_started
            && self.time_committed == other.time_committed
    }
}

impl Eq for CommandBatch {}

/// A unit of work: one batch plus the resources needed to commit it.
///
/// Created immediately before commit, consumed exactly once by the commit
/// process. The commitment is created fresh per instance, one-to-one.
#[derive(Debug)]
pub struct TransactionToApply {
    batch: CommandBatch,
    commitment: Commitment,
    transaction_id: Option<TransactionId>,
    checksum: Option<u32>,
    log_position: Option<LogPosition>,
}

impl TransactionToApply {
    pub fn new(batch: CommandBatch, id_store: Arc<TransactionIdStore>) -> Self {
        Self {
            batch,
            commitment: Commitment::new(id_store),
            transaction_id: None,
            checksum: None,
            log_position: None,
        }
    }

    pub fn batch(&self) -> &CommandBatch {
        &self.batch
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn commitment_mut(&mut self) -> &mut Commitment {
        &mut self.commitment
    }

    /// The id allocated by the appender, if append got that far.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    /// The checksum of this batch's serialized log record, if appended.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// First byte after this batch's record in the log, if appended. This is
    /// the position replay resumes at once the batch is accounted for.
    pub fn log_position(&self) -> Option<LogPosition> {
        self.log_position
    }

    /// Called by the appender once the record is written: id allocated,
    /// commitment bound, bytes placed.
    pub(crate) fn assign(
        &mut self,
        transaction_id: TransactionId,
        checksum: u32,
        log_position: LogPosition,
    ) {
        self.transaction_id = Some(transaction_id);
        self.checksum = Some(checksum);
        self.log_position = Some(log_position);
    }
}

/// Owning, ordered chain of batches composing one logical transaction.
///
/// Applied strictly in order. Construction validates the first/last flags so
/// downstream code never has to re-check them.
#[derive(Debug)]
pub struct TransactionChain {
    transactions: Vec<TransactionToApply>,
}

impl TransactionChain {
    /// Assembles a chain, validating the batch flags: the first batch must
    /// carry `is_first`, the last must carry `is_last`, and no batch in
    /// between may carry either.
    pub fn new(transactions: Vec<TransactionToApply>) -> CommitResult<Self> {
        if transactions.is_empty() {
            return Err(CommitError::invalid_chain("chain has no batches"));
        }
        let last_index = transactions.len() - 1;
        for (index, tx) in transactions.iter().enumerate() {
            let batch = tx.batch();
            if batch.is_first() != (index == 0) {
                return Err(CommitError::invalid_chain(format!(
                    "batch {} has is_first={}, expected {}",
                    index,
                    batch.is_first(),
                    index == 0
                )));
            }
            if batch.is_last() != (index == last_index) {
                return Err(CommitError::invalid_chain(format!(
                    "batch {} has is_last={}, expected {}",
                    index,
                    batch.is_last(),
                    index == last_index
                )));
            }
        }
        Ok(Self { transactions })
    }

    /// A chain of exactly one singleton batch.
    pub fn singleton(transaction: TransactionToApply) -> CommitResult<Self> {
        Self::new(vec![transaction])
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransactionToApply> {
        self.transactions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, TransactionToApply> {
        self.transactions.iter_mut()
    }

    /// Id of the last batch in the chain, if the whole chain was appended.
    /// This is the id `commit` returns on success.
    pub fn last_transaction_id(&self) -> Option<TransactionId> {
        self.transactions.last().and_then(|tx| tx.transaction_id())
    }
}
