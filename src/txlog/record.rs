//! Transaction log record format
//!
//! Each log record is one command batch plus its header, self-describing and
//! replayable:
//!
//! - Record Length (u32 LE, total bytes including length and checksum)
//! - Record Type (u8)
//! - Transaction Id (u64 LE)
//! - Store Version (u8)
//! - Lease Id (i32 LE)
//! - Chain Flags (u8: bit 0 = first, bit 1 = last)
//! - Time Started, Time Committed (u64 LE, milliseconds)
//! - Latest Committed Tx When Started (u64 LE)
//! - Subject (u8 tag, plus length-prefixed name for named users)
//! - Additional Header (u32 length + bytes)
//! - Commands (u32 count, then tagged command encodings)
//! - Checksum (u32 LE, CRC32 over everything between length and checksum)
//!
//! All integers little-endian; all strings and byte arrays length-prefixed.

use std::io::{self, Cursor, Read};

use super::checksum::{compute_checksum, verify_checksum};
use crate::commit::{CommandBatch, EntityRef, StorageCommand, StoreVersion, Subject};
use crate::txid::TransactionId;

/// The only record type written today; the tag leaves room for more.
pub const RECORD_TYPE_TRANSACTION: u8 = 1;

/// Smallest possible record: empty header, zero commands, anonymous subject.
pub const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 1 + 4 + 1 + 8 + 8 + 8 + 1 + 4 + 4 + 4;

const FLAG_FIRST: u8 = 0b01;
const FLAG_LAST: u8 = 0b10;

const SUBJECT_ANONYMOUS: u8 = 0;
const SUBJECT_SYSTEM: u8 = 1;
const SUBJECT_USER: u8 = 2;

const CMD_CREATE_NODE: u8 = 0;
const CMD_DELETE_NODE: u8 = 1;
const CMD_CREATE_RELATIONSHIP: u8 = 2;
const CMD_DELETE_RELATIONSHIP: u8 = 3;
const CMD_SET_PROPERTY: u8 = 4;
const CMD_REMOVE_PROPERTY: u8 = 5;

const ENTITY_NODE: u8 = 0;
const ENTITY_RELATIONSHIP: u8 = 1;

/// One durable log record: a transaction id and its command batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLogRecord {
    pub transaction_id: TransactionId,
    pub batch: CommandBatch,
}

impl TransactionLogRecord {
    pub fn new(transaction_id: TransactionId, batch: CommandBatch) -> Self {
        Self {
            transaction_id,
            batch,
        }
    }

    /// Serializes the record, returning the bytes and the checksum that was
    /// embedded in them. The checksum is what commitments publish.
    pub fn serialize_with_checksum(&self) -> (Vec<u8>, u32) {
        let batch = &self.batch;
        let mut body = Vec::with_capacity(MIN_RECORD_SIZE + 64);

        body.push(RECORD_TYPE_TRANSACTION);
        body.extend_from_slice(&self.transaction_id.value().to_le_bytes());
        body.push(batch.version().0);
        body.extend_from_slice(&batch.lease_id().to_le_bytes());

        let mut flags = 0u8;
        if batch.is_first() {
            flags |= FLAG_FIRST;
        }
        if batch.is_last() {
            flags |= FLAG_LAST;
        }
        body.push(flags);

        body.extend_from_slice(&batch.time_started().to_le_bytes());
        body.extend_from_slice(&batch.time_committed().to_le_bytes());
        body.extend_from_slice(
            &batch
                .latest_committed_tx_when_started()
                .value()
                .to_le_bytes(),
        );

        match batch.subject() {
            Subject::Anonymous => body.push(SUBJECT_ANONYMOUS),
            Subject::System => body.push(SUBJECT_SYSTEM),
            Subject::User(name) => {
                body.push(SUBJECT_USER);
                put_bytes(&mut body, name.as_bytes());
            }
        }

        put_bytes(&mut body, batch.additional_header());

        body.extend_from_slice(&(batch.command_count() as u32).to_le_bytes());
        for command in batch.commands() {
            encode_command(&mut body, command);
        }

        let checksum = compute_checksum(&body);

        let total_length = 4 + body.len() + 4;
        let mut record = Vec::with_capacity(total_length);
        record.extend_from_slice(&(total_length as u32).to_le_bytes());
        record.extend_from_slice(&body);
        record.extend_from_slice(&checksum.to_le_bytes());
        (record, checksum)
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_with_checksum().0
    }

    /// Parses one record from the front of `data`, verifying structure and
    /// checksum. Returns the record, its checksum, and the bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, u32, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(invalid(format!(
                "record shorter than minimum: {} bytes, need {}",
                data.len(),
                MIN_RECORD_SIZE
            )));
        }

        let total_length =
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if total_length < MIN_RECORD_SIZE {
            return Err(invalid(format!("invalid record length: {}", total_length)));
        }
        if total_length > data.len() {
            return Err(invalid(format!(
                "record length {} exceeds available {} bytes",
                total_length,
                data.len()
            )));
        }

        let body = &data[4..total_length - 4];
        let stored_checksum = u32::from_le_bytes([
            data[total_length - 4],
            data[total_length - 3],
            data[total_length - 2],
            data[total_length - 1],
        ]);
        if !verify_checksum(body, stored_checksum) {
            return Err(invalid("checksum mismatch"));
        }

        let mut cursor = Cursor::new(body);

        let record_type = read_u8(&mut cursor)?;
        if record_type != RECORD_TYPE_TRANSACTION {
            return Err(invalid(format!("unknown record type: {}", record_type)));
        }

        let transaction_id = TransactionId::new(read_u64(&mut cursor)?);
        let version = StoreVersion(read_u8(&mut cursor)?);
        let lease_id = read_i32(&mut cursor)?;
        let flags = read_u8(&mut cursor)?;
        let time_started = read_u64(&mut cursor)?;
        let time_committed = read_u64(&mut cursor)?;
        let latest_committed = TransactionId::new(read_u64(&mut cursor)?);

        let subject = match read_u8(&mut cursor)? {
            SUBJECT_ANONYMOUS => Subject::Anonymous,
            SUBJECT_SYSTEM => Subject::System,
            SUBJECT_USER => Subject::User(read_string(&mut cursor)?),
            tag => return Err(invalid(format!("unknown subject tag: {}", tag))),
        };

        let additional_header = read_byte_vec(&mut cursor)?;

        let command_count = read_u32(&mut cursor)? as usize;
        let mut commands = Vec::with_capacity(command_count);
        for _ in 0..command_count {
            commands.push(decode_command(&mut cursor)?);
        }

        if cursor.position() as usize != body.len() {
            return Err(invalid("trailing bytes after last command"));
        }

        let batch = CommandBatch::from_log_parts(
            commands,
            additional_header,
            time_started,
            latest_committed,
            time_committed,
            lease_id,
            subject,
            version,
            flags & FLAG_FIRST != 0,
            flags & FLAG_LAST != 0,
        );

        Ok((
            Self {
                transaction_id,
                batch,
            },
            stored_checksum,
            total_length,
        ))
    }
}

fn encode_command(buf: &mut Vec<u8>, command: &StorageCommand) {
    match command {
        StorageCommand::CreateNode { node_id, labels } => {
            buf.push(CMD_CREATE_NODE);
            buf.extend_from_slice(&node_id.to_le_bytes());
            buf.extend_from_slice(&(labels.len() as u32).to_le_bytes());
            for label in labels {
                put_bytes(buf, label.as_bytes());
            }
        }
        StorageCommand::DeleteNode { node_id } => {
            buf.push(CMD_DELETE_NODE);
            buf.extend_from_slice(&node_id.to_le_bytes());
        }
        StorageCommand::CreateRelationship {
            relationship_id,
            start_node,
            end_node,
            relationship_type,
        } => {
            buf.push(CMD_CREATE_RELATIONSHIP);
            buf.extend_from_slice(&relationship_id.to_le_bytes());
            buf.extend_from_slice(&start_node.to_le_bytes());
            buf.extend_from_slice(&end_node.to_le_bytes());
            put_bytes(buf, relationship_type.as_bytes());
        }
        StorageCommand::DeleteRelationship { relationship_id } => {
            buf.push(CMD_DELETE_RELATIONSHIP);
            buf.extend_from_slice(&relationship_id.to_le_bytes());
        }
        StorageCommand::SetProperty { entity, key, value } => {
            buf.push(CMD_SET_PROPERTY);
            encode_entity(buf, *entity);
            put_bytes(buf, key.as_bytes());
            put_bytes(buf, value.as_bytes());
        }
        StorageCommand::RemoveProperty { entity, key } => {
            buf.push(CMD_REMOVE_PROPERTY);
            encode_entity(buf, *entity);
            put_bytes(buf, key.as_bytes());
        }
    }
}

fn decode_command(cursor: &mut Cursor<&[u8]>) -> io::Result<StorageCommand> {
    match read_u8(cursor)? {
        CMD_CREATE_NODE => {
            let node_id = read_u64(cursor)?;
            let label_count = read_u32(cursor)? as usize;
            let mut labels = Vec::with_capacity(label_count);
            for _ in 0..label_count {
                labels.push(read_string(cursor)?);
            }
            Ok(StorageCommand::CreateNode { node_id, labels })
        }
        CMD_DELETE_NODE => Ok(StorageCommand::DeleteNode {
            node_id: read_u64(cursor)?,
        }),
        CMD_CREATE_RELATIONSHIP => Ok(StorageCommand::CreateRelationship {
            relationship_id: read_u64(cursor)?,
            start_node: read_u64(cursor)?,
            end_node: read_u64(cursor)?,
            relationship_type: read_string(cursor)?,
        }),
        CMD_DELETE_RELATIONSHIP => Ok(StorageCommand::DeleteRelationship {
            relationship_id: read_u64(cursor)?,
        }),
        CMD_SET_PROPERTY => Ok(StorageCommand::SetProperty {
            entity: decode_entity(cursor)?,
            key: read_string(cursor)?,
            value: read_string(cursor)?,
        }),
        CMD_REMOVE_PROPERTY => Ok(StorageCommand::RemoveProperty {
            entity: decode_entity(cursor)?,
            key: read_string(cursor)?,
        }),
        tag => Err(invalid(format!("unknown command tag: {}", tag))),
    }
}

fn encode_entity(buf: &mut Vec<u8>, entity: EntityRef) {
    match entity {
        EntityRef::Node(id) => {
            buf.push(ENTITY_NODE);
            buf.extend_from_slice(&id.to_le_bytes());
        }
        EntityRef::Relationship(id) => {
            buf.push(ENTITY_RELATIONSHIP);
            buf.extend_from_slice(&id.to_le_bytes());
        }
    }
}

fn decode_entity(cursor: &mut Cursor<&[u8]>) -> io::Result<EntityRef> {
    match read_u8(cursor)? {
        ENTITY_NODE => Ok(EntityRef::Node(read_u64(cursor)?)),
        ENTITY_RELATIONSHIP => Ok(EntityRef::Relationship(read_u64(cursor)?)),
        tag => Err(invalid(format!("unknown entity tag: {}", tag))),
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_byte_vec(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let length = read_u32(cursor)? as usize;
    let mut bytes = vec![0u8; length];
    cursor.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    let bytes = read_byte_vec(cursor)?;
    String::from_utf8(bytes)
        .map_err(|e| invalid(format!("invalid UTF-8 in record: {}", e)))
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::NO_LEASE;

    fn sample_batch() -> CommandBatch {
        CommandBatch::new(
            vec![
                StorageCommand::CreateNode {
                    node_id: 7,
                    labels: vec!["Person".to_string(), "Admin".to_string()],
                },
                StorageCommand::CreateRelationship {
                    relationship_id: 3,
                    start_node: 7,
                    end_node: 9,
                    relationship_type: "KNOWS".to_string(),
                },
                StorageCommand::SetProperty {
                    entity: EntityRef::Node(7),
                    key: "name".to_string(),
                    value: "Ada".to_string(),
                },
                StorageCommand::RemoveProperty {
                    entity: EntityRef::Relationship(3),
                    key: "weight".to_string(),
                },
                StorageCommand::DeleteRelationship { relationship_id: 3 },
                StorageCommand::DeleteNode { node_id: 9 },
            ],
            vec![0xCA, 0xFE],
            1000,
            TransactionId::new(41),
            2000,
            17,
            Subject::User("erin".to_string()),
        )
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let record = TransactionLogRecord::new(TransactionId::new(42), sample_batch());
        let (bytes, checksum) = record.serialize_with_checksum();

        let (parsed, parsed_checksum, consumed) =
            TransactionLogRecord::deserialize(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed_checksum, checksum);
        assert_eq!(parsed.transaction_id, TransactionId::new(42));
        assert_eq!(parsed.batch, record.batch);
        assert_eq!(parsed.batch.lease_id(), 17);
        assert_eq!(parsed.batch.subject(), &Subject::User("erin".to_string()));
        assert_eq!(
            parsed.batch.latest_committed_tx_when_started(),
            TransactionId::new(41)
        );
        assert!(parsed.batch.is_first() && parsed.batch.is_last());
    }

    #[test]
    fn test_empty_batch_round_trips() {
        let batch = CommandBatch::new(
            Vec::new(),
            Vec::new(),
            5,
            TransactionId::BASE,
            5,
            NO_LEASE,
            Subject::Anonymous,
        );
        let record = TransactionLogRecord::new(TransactionId::new(1), batch);
        let bytes = record.serialize();
        assert_eq!(bytes.len(), MIN_RECORD_SIZE);

        let (parsed, _, _) = TransactionLogRecord::deserialize(&bytes).unwrap();
        assert_eq!(parsed.batch.command_count(), 0);
        assert_eq!(parsed.batch.lease_id(), NO_LEASE);
    }

    #[test]
    fn test_chain_flags_survive() {
        let batch = sample_batch().with_chain_position(false, true);
        let record = TransactionLogRecord::new(TransactionId::new(2), batch);
        let (parsed, _, _) = TransactionLogRecord::deserialize(&record.serialize()).unwrap();
        assert!(!parsed.batch.is_first());
        assert!(parsed.batch.is_last());
    }

    #[test]
    fn test_corrupted_byte_fails_checksum() {
        let record = TransactionLogRecord::new(TransactionId::new(3), sample_batch());
        let mut bytes = record.serialize();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xFF;

        let err = TransactionLogRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let record = TransactionLogRecord::new(TransactionId::new(4), sample_batch());
        let bytes = record.serialize();

        let err = TransactionLogRecord::deserialize(&bytes[..bytes.len() - 5]).unwrap_err();
        assert!(err.to_string().contains("exceeds available"));
    }

    #[test]
    fn test_unknown_record_type_rejected() {
        let record = TransactionLogRecord::new(TransactionId::new(5), sample_batch());
        let mut bytes = record.serialize();
        bytes[4] = 0xEE;
        // Fix the checksum so the type check itself is what fires.
        let body_len = bytes.len() - 8;
        let checksum = compute_checksum(&bytes[4..4 + body_len]);
        let end = bytes.len();
        bytes[end - 4..].copy_from_slice(&checksum.to_le_bytes());

        let err = TransactionLogRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown record type"));
    }
}
