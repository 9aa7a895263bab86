//! In-memory graph store
//!
//! A minimal storage engine: nodes and relationships in hash maps behind one
//! `RwLock`. It exists so the commit pipeline, the check pointer, and
//! recovery have a real collaborator to apply command chains to; it is not an
//! on-disk store.
//!
//! Apply semantics:
//! - Commands within a chain are applied strictly in chain order.
//! - In `Recovery` mode, re-applied creates overwrite and deletes of missing
//!   entities are ignored, so replaying a prefix of already-applied history
//!   converges instead of faulting.

use std::collections::HashMap;
use std::sync::RwLock;

use super::engine::{ApplicationMode, ApplyError, ApplyResult, StorageEngine};
use crate::commit::{EntityRef, StorageCommand, TransactionChain};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub labels: Vec<String>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub start_node: u64,
    pub end_node: u64,
    pub relationship_type: String,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<u64, NodeRecord>,
    relationships: HashMap<u64, RelationshipRecord>,
}

impl GraphState {
    fn apply_command(&mut self, command: &StorageCommand, mode: ApplicationMode) -> ApplyResult<()> {
        match command {
            StorageCommand::CreateNode { node_id, labels } => {
                if self.nodes.contains_key(node_id) && !mode.is_recovery() {
                    return Err(ApplyError::NodeAlreadyExists(*node_id));
                }
                self.nodes.insert(
                    *node_id,
                    NodeRecord {
                        labels: labels.clone(),
                        properties: HashMap::new(),
                    },
                );
                Ok(())
            }
            StorageCommand::DeleteNode { node_id } => {
                let attached = self
                    .relationships
                    .values()
                    .any(|rel| rel.start_node == *node_id || rel.end_node == *node_id);
                if attached {
                    return Err(ApplyError::NodeHasRelationships(*node_id));
                }
                if self.nodes.remove(node_id).is_none() && !mode.is_recovery() {
                    return Err(ApplyError::NodeNotFound(*node_id));
                }
                Ok(())
            }
            StorageCommand::CreateRelationship {
                relationship_id,
                start_node,
                end_node,
                relationship_type,
            } => {
                if self.relationships.contains_key(relationship_id) && !mode.is_recovery() {
                    return Err(ApplyError::RelationshipAlreadyExists(*relationship_id));
                }
                if !self.nodes.contains_key(start_node) {
                    return Err(ApplyError::NodeNotFound(*start_node));
                }
                if !self.nodes.contains_key(end_node) {
                    return Err(ApplyError::NodeNotFound(*end_node));
                }
                self.relationships.insert(
                    *relationship_id,
                    RelationshipRecord {
                        start_node: *start_node,
                        end_node: *end_node,
                        relationship_type: relationship_type.clone(),
                        properties: HashMap::new(),
                    },
                );
                Ok(())
            }
            StorageCommand::DeleteRelationship { relationship_id } => {
                if self.relationships.remove(relationship_id).is_none() && !mode.is_recovery() {
                    return Err(ApplyError::RelationshipNotFound(*relationship_id));
                }
                Ok(())
            }
            StorageCommand::SetProperty { entity, key, value } => {
                self.properties_mut(*entity)?
                    .insert(key.clone(), value.clone());
                Ok(())
            }
            StorageCommand::RemoveProperty { entity, key } => {
                self.properties_mut(*entity)?.remove(key);
                Ok(())
            }
        }
    }

    fn properties_mut(&mut self, entity: EntityRef) -> ApplyResult<&mut HashMap<String, String>> {
        match entity {
            EntityRef::Node(node_id) => self
                .nodes
                .get_mut(&node_id)
                .map(|node| &mut node.properties)
                .ok_or(ApplyError::NodeNotFound(node_id)),
            EntityRef::Relationship(relationship_id) => self
                .relationships
                .get_mut(&relationship_id)
                .map(|rel| &mut rel.properties)
                .ok_or(ApplyError::RelationshipNotFound(relationship_id)),
        }
    }
}

/// In-memory graph storage engine.
#[derive(Debug, Default)]
pub struct GraphStore {
    state: RwLock<GraphState>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().expect("graph state poisoned").nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state
            .read()
            .expect("graph state poisoned")
            .relationships
            .len()
    }

    pub fn node(&self, node_id: u64) -> Option<NodeRecord> {
        self.state
            .read()
            .expect("graph state poisoned")
            .nodes
            .get(&node_id)
            .cloned()
    }

    pub fn relationship(&self, relationship_id: u64) -> Option<RelationshipRecord> {
        self.state
            .read()
            .expect("graph state poisoned")
            .relationships
            .get(&relationship_id)
            .cloned()
    }
}

impl StorageEngine for GraphStore {
    fn apply(&self, chain: &TransactionChain, mode: ApplicationMode) -> ApplyResult<()> {
        let mut state = self.state.write().expect("graph state poisoned");
        for transaction in chain.iter() {
            for command in transaction.batch().commands() {
                state.apply_command(command, mode)?;
            }
        }
        Ok(())
    }

    fn flush(&self) -> ApplyResult<()> {
        // Nothing buffered: the in-memory store is always "flushed".
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{CommandBatch, Subject, TransactionToApply, NO_LEASE};
    use crate::txid::{TransactionId, TransactionIdStore};
    use std::sync::Arc;

    fn chain_of(commands: Vec<StorageCommand>) -> TransactionChain {
        let id_store = Arc::new(TransactionIdStore::new());
        let batch = CommandBatch::new(
            commands,
            Vec::new(),
            1,
            TransactionId::BASE,
            2,
            NO_LEASE,
            Subject::Anonymous,
        );
        TransactionChain::singleton(TransactionToApply::new(batch, id_store)).unwrap()
    }

    #[test]
    fn test_create_node_and_set_property() {
        let store = GraphStore::new();
        let chain = chain_of(vec![
            StorageCommand::CreateNode {
                node_id: 1,
                labels: vec!["Person".to_string()],
            },
            StorageCommand::SetProperty {
                entity: EntityRef::Node(1),
                key: "name".to_string(),
                value: "Ada".to_string(),
            },
        ]);

        store.apply(&chain, ApplicationMode::External).unwrap();

        let node = store.node(1).unwrap();
        assert_eq!(node.labels, vec!["Person".to_string()]);
        assert_eq!(node.properties.get("name").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn test_relationship_requires_both_endpoints() {
        let store = GraphStore::new();
        let chain = chain_of(vec![
            StorageCommand::CreateNode {
                node_id: 1,
                labels: Vec::new(),
            },
            StorageCommand::CreateRelationship {
                relationship_id: 10,
                start_node: 1,
                end_node: 2,
                relationship_type: "KNOWS".to_string(),
            },
        ]);

        let err = store.apply(&chain, ApplicationMode::External).unwrap_err();
        assert_eq!(err, ApplyError::NodeNotFound(2));
    }

    #[test]
    fn test_duplicate_create_rejected_outside_recovery() {
        let store = GraphStore::new();
        let create = vec![StorageCommand::CreateNode {
            node_id: 1,
            labels: Vec::new(),
        }];
        store
            .apply(&chain_of(create.clone()), ApplicationMode::External)
            .unwrap();

        let err = store
            .apply(&chain_of(create.clone()), ApplicationMode::External)
            .unwrap_err();
        assert_eq!(err, ApplyError::NodeAlreadyExists(1));

        // Replay of already-applied history converges.
        store
            .apply(&chain_of(create), ApplicationMode::Recovery)
            .unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_delete_missing_ignored_in_recovery() {
        let store = GraphStore::new();
        let delete = vec![StorageCommand::DeleteNode { node_id: 9 }];

        let err = store
            .apply(&chain_of(delete.clone()), ApplicationMode::External)
            .unwrap_err();
        assert_eq!(err, ApplyError::NodeNotFound(9));

        store
            .apply(&chain_of(delete), ApplicationMode::Recovery)
            .unwrap();
    }

    #[test]
    fn test_delete_node_with_relationships_rejected() {
        let store = GraphStore::new();
        store
            .apply(
                &chain_of(vec![
                    StorageCommand::CreateNode {
                        node_id: 1,
                        labels: Vec::new(),
                    },
                    StorageCommand::CreateNode {
                        node_id: 2,
                        labels: Vec::new(),
                    },
                    StorageCommand::CreateRelationship {
                        relationship_id: 10,
                        start_node: 1,
                        end_node: 2,
                        relationship_type: "KNOWS".to_string(),
                    },
                ]),
                ApplicationMode::External,
            )
            .unwrap();

        let err = store
            .apply(
                &chain_of(vec![StorageCommand::DeleteNode { node_id: 1 }]),
                ApplicationMode::External,
            )
            .unwrap_err();
        assert_eq!(err, ApplyError::NodeHasRelationships(1));
    }

    #[test]
    fn test_remove_property() {
        let store = GraphStore::new();
        store
            .apply(
                &chain_of(vec![
                    StorageCommand::CreateNode {
                        node_id: 1,
                        labels: Vec::new(),
                    },
                    StorageCommand::SetProperty {
                        entity: EntityRef::Node(1),
                        key: "name".to_string(),
                        value: "Ada".to_string(),
                    },
                    StorageCommand::RemoveProperty {
                        entity: EntityRef::Node(1),
                        key: "name".to_string(),
                    },
                ]),
                ApplicationMode::External,
            )
            .unwrap();

        assert!(store.node(1).unwrap().properties.is_empty());
    }
}
