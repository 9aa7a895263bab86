//! Transaction appender
//!
//! Turns a transaction chain into durable log records:
//!
//! 1. For each batch in chain order: allocate the next transaction id, bind
//!    the batch's commitment to it, serialize the batch as one record, write.
//! 2. After the whole chain is written, fsync once. A chain shares one fsync
//!    the way concurrent commits share one in a group commit; no batch is
//!    acknowledged before that fsync returns.
//!
//! Id allocation and the write happen under the same lock, so log record
//! order equals allocation order equals append-call order: if A's append
//! returns before B's begins, A's records precede B's.
//!
//! Failure: the error surfaces to the caller; ids already allocated stay
//! allocated and bound. Closing them is the commit process's job.

use std::sync::{Arc, Mutex};

use super::errors::TxLogResult;
use super::record::TransactionLogRecord;
use super::writer::LogWriter;
use crate::commit::TransactionChain;
use crate::txid::{TransactionId, TransactionIdStore};

/// The appender as seen by the commit process.
pub trait TransactionAppender: Send + Sync {
    /// Appends the whole chain durably, returning the id of the last batch.
    ///
    /// On return, every batch in the chain has its id, checksum, and log
    /// position assigned and its commitment bound. On error, a prefix of the
    /// chain may have bound ids with nothing durable on disk.
    fn append(&self, chain: &mut TransactionChain) -> TxLogResult<TransactionId>;
}

/// Appender writing to the single-file transaction log.
#[derive(Debug)]
pub struct LogTransactionAppender {
    log: Mutex<LogWriter>,
    id_store: Arc<TransactionIdStore>,
}

impl LogTransactionAppender {
    pub fn new(log: LogWriter, id_store: Arc<TransactionIdStore>) -> Self {
        Self {
            log: Mutex::new(log),
            id_store,
        }
    }

    /// Current logical end of the log.
    pub fn log_position(&self) -> super::writer::LogPosition {
        self.log.lock().expect("log writer poisoned").position()
    }
}

impl TransactionAppender for LogTransactionAppender {
    fn append(&self, chain: &mut TransactionChain) -> TxLogResult<TransactionId> {
        let mut log = self.log.lock().expect("log writer poisoned");

        let mut last_id = TransactionId::BASE;
        for transaction in chain.iter_mut() {
            let transaction_id = self.id_store.next_id();
            transaction.commitment_mut().bind_to(transaction_id);

            let record =
                TransactionLogRecord::new(transaction_id, transaction.batch().clone());
            let (bytes, checksum) = record.serialize_with_checksum();

            log.append(&bytes)?;
            transaction.assign(transaction_id, checksum, log.position());
            last_id = transaction_id;
        }

        // One fsync covers the whole chain; only now is anything durable.
        log.sync()?;
        Ok(last_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{
        CommandBatch, StorageCommand, Subject, TransactionToApply, NO_LEASE,
    };
    use crate::txlog::reader::LogReader;
    use tempfile::TempDir;

    fn batch(node_id: u64) -> CommandBatch {
        CommandBatch::new(
            vec![StorageCommand::CreateNode {
                node_id,
                labels: Vec::new(),
            }],
            Vec::new(),
            10,
            TransactionId::BASE,
            20,
            NO_LEASE,
            Subject::Anonymous,
        )
    }

    fn appender(temp_dir: &TempDir) -> (LogTransactionAppender, Arc<TransactionIdStore>) {
        let id_store = Arc::new(TransactionIdStore::new());
        let log = LogWriter::open(temp_dir.path()).unwrap();
        (
            LogTransactionAppender::new(log, Arc::clone(&id_store)),
            id_store,
        )
    }

    #[test]
    fn test_append_assigns_id_checksum_and_position() {
        let temp_dir = TempDir::new().unwrap();
        let (appender, id_store) = appender(&temp_dir);

        let mut chain = TransactionChain::singleton(TransactionToApply::new(
            batch(1),
            Arc::clone(&id_store),
        ))
        .unwrap();

        let last_id = appender.append(&mut chain).unwrap();
        assert_eq!(last_id, TransactionId::new(1));

        let tx = chain.iter().next().unwrap();
        assert_eq!(tx.transaction_id(), Some(TransactionId::new(1)));
        assert!(tx.checksum().is_some());
        assert_eq!(tx.log_position(), Some(appender.log_position()));
        assert!(tx.commitment().is_bound());
    }

    #[test]
    fn test_chain_gets_consecutive_ids_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let (appender, id_store) = appender(&temp_dir);

        let first = TransactionToApply::new(
            batch(1).with_chain_position(true, false),
            Arc::clone(&id_store),
        );
        let last = TransactionToApply::new(
            batch(2).with_chain_position(false, true),
            Arc::clone(&id_store),
        );
        let mut chain = TransactionChain::new(vec![first, last]).unwrap();

        let last_id = appender.append(&mut chain).unwrap();
        assert_eq!(last_id, TransactionId::new(2));

        let ids: Vec<_> = chain.iter().map(|tx| tx.transaction_id()).collect();
        assert_eq!(
            ids,
            vec![Some(TransactionId::new(1)), Some(TransactionId::new(2))]
        );
    }

    #[test]
    fn test_appended_records_read_back_identically() {
        let temp_dir = TempDir::new().unwrap();
        let (appender, id_store) = appender(&temp_dir);

        let original = batch(7);
        let mut chain = TransactionChain::singleton(TransactionToApply::new(
            original.clone(),
            Arc::clone(&id_store),
        ))
        .unwrap();
        appender.append(&mut chain).unwrap();

        let mut reader = LogReader::open_from_data_dir(temp_dir.path()).unwrap();
        let logged = reader.read_next().unwrap().unwrap();
        assert_eq!(logged.record.batch, original);
        assert_eq!(
            Some(logged.checksum),
            chain.iter().next().unwrap().checksum()
        );
    }

    #[test]
    fn test_sequential_appends_interleave_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (appender, id_store) = appender(&temp_dir);

        for node_id in 1..=5 {
            let mut chain = TransactionChain::singleton(TransactionToApply::new(
                batch(node_id),
                Arc::clone(&id_store),
            ))
            .unwrap();
            appender.append(&mut chain).unwrap();
        }

        let mut reader = LogReader::open_from_data_dir(temp_dir.path()).unwrap();
        let ids: Vec<u64> = reader
            .read_all()
            .unwrap()
            .iter()
            .map(|r| r.record.transaction_id.value())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_concurrent_appends_keep_log_order_equal_to_id_order() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let (appender, id_store) = appender(&temp_dir);
        let appender = Arc::new(appender);

        let mut handles = Vec::new();
        for worker in 0..4 {
            let appender = Arc::clone(&appender);
            let id_store = Arc::clone(&id_store);
            handles.push(thread::spawn(move || {
                for i in 0..10 {
                    let mut chain = TransactionChain::singleton(TransactionToApply::new(
                        batch(worker * 100 + i),
                        Arc::clone(&id_store),
                    ))
                    .unwrap();
                    appender.append(&mut chain).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut reader = LogReader::open_from_data_dir(temp_dir.path()).unwrap();
        let ids: Vec<u64> = reader
            .read_all()
            .unwrap()
            .iter()
            .map(|r| r.record.transaction_id.value())
            .collect();
        // Strictly increasing by one: log order equals allocation order.
        assert_eq!(ids, (1..=40).collect::<Vec<u64>>());
    }
}
