//! Storage engine boundary and the in-memory graph store
//!
//! The durability core consumes the storage engine, it does not own it. This
//! module defines the boundary (`StorageEngine`, `ApplicationMode`,
//! `ApplyError`) and ships a minimal in-memory engine behind it.

mod engine;
mod graph_store;

pub use engine::{ApplicationMode, ApplyError, ApplyResult, StorageEngine};
pub use graph_store::{GraphStore, NodeRecord, RelationshipRecord};
