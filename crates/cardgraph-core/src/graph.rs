//! # Graph Store
//!
//! The store seam of the pipeline and its in-memory implementation.
//!
//! Every backend implements `GraphStore`. Methods take `&self` so a single
//! store handle is shared by all workers; each backend is responsible for
//! making `merge_node` atomic per key.

use crate::{CardGraphError, NodeId, Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// Operations the pipeline needs from a property graph.
///
/// All fallible operations return `Result<T, CardGraphError>`; callers decide
/// whether a failure is skipped or reported.
pub trait GraphStore: Send + Sync {
    /// Create-or-update the node `(label, key = properties[key])`.
    ///
    /// If a node with that label and key value exists, its properties are
    /// replaced by `properties`; otherwise a new node is created. Never
    /// produces two nodes for the same key.
    fn merge_node(&self, label: &str, key: &str, properties: &Record)
    -> Result<NodeId, CardGraphError>;

    /// Point lookup of a node by label and key value.
    fn find_node(&self, label: &str, key: &str, value: &Value)
    -> Result<Option<NodeId>, CardGraphError>;

    /// Create a directed relationship carrying `properties`.
    fn create_relationship(
        &self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
        properties: &Record,
    ) -> Result<(), CardGraphError>;

    /// Whether at least one node carries `label`.
    fn label_exists(&self, label: &str) -> Result<bool, CardGraphError>;

    /// Whether at least one `(from_label)-[rel_type]->(to_label)` edge exists.
    fn relationship_exists(
        &self,
        from_label: &str,
        rel_type: &str,
        to_label: &str,
    ) -> Result<bool, CardGraphError>;

    /// Delete every node with `label` and all of its relationships.
    ///
    /// Returns the number of nodes deleted.
    fn delete_label(&self, label: &str) -> Result<usize, CardGraphError>;

    /// Delete every relationship, of any type and direction, between nodes
    /// labelled `from_label` and `to_label`.
    ///
    /// Returns the number of relationships deleted.
    fn delete_relationships(&self, from_label: &str, to_label: &str)
    -> Result<usize, CardGraphError>;

    /// Require `property` to be unique across relationships of `rel_type`.
    fn create_relationship_constraint(
        &self,
        rel_type: &str,
        property: &str,
    ) -> Result<(), CardGraphError>;

    /// Require `key` to be unique across nodes of `label`.
    ///
    /// Backends whose `merge_node` is already atomic per key keep this
    /// no-op; servers that only lock a merged key under a constraint
    /// override it.
    fn create_node_constraint(&self, _label: &str, _key: &str) -> Result<(), CardGraphError> {
        Ok(())
    }

    /// Number of nodes carrying `label`.
    fn node_count(&self, label: &str) -> Result<usize, CardGraphError>;

    /// Number of relationships of `rel_type`.
    fn relationship_count(&self, rel_type: &str) -> Result<usize, CardGraphError>;
}

// =============================================================================
// STORED RECORDS
// =============================================================================

/// A node as held by the embedded backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub label: String,
    /// Attribute the node was merged on.
    pub primary_key: String,
    /// Type-tagged key value (see `Value::key_string`).
    pub key: String,
    pub properties: Record,
}

/// A relationship as held by the embedded backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub from: NodeId,
    pub to: NodeId,
    pub rel_type: String,
    pub properties: Record,
}

/// Extract and encode the merge key from a property map.
pub(crate) fn merge_key(key: &str, properties: &Record) -> Result<String, CardGraphError> {
    properties
        .get(key)
        .map(Value::key_string)
        .ok_or_else(|| CardGraphError::MissingColumn(key.to_string()))
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeId, StoredNode>,
    /// (label, key attribute, encoded key value) -> node
    key_index: BTreeMap<(String, String, String), NodeId>,
    relationships: BTreeMap<u64, StoredRelationship>,
    /// rel_type -> unique property
    constraints: BTreeMap<String, String>,
    /// (rel_type, encoded property value) of constrained relationships
    unique_values: BTreeSet<(String, String)>,
    next_node_id: u64,
    next_relationship_id: u64,
}

impl MemoryState {
    fn label_of(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.label.as_str())
    }

    fn unique_entry(&self, rel: &StoredRelationship) -> Option<(String, String)> {
        let property = self.constraints.get(&rel.rel_type)?;
        let value = rel.properties.get(property)?;
        Some((rel.rel_type.clone(), value.key_string()))
    }

    fn remove_relationships(&mut self, doomed: &[u64]) {
        for id in doomed {
            if let Some(rel) = self.relationships.remove(id)
                && let Some(entry) = self.unique_entry(&rel)
            {
                self.unique_values.remove(&entry);
            }
        }
    }
}

/// A mutex-guarded in-memory graph.
///
/// Each operation holds the lock for its whole duration, so merges are
/// atomic. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<MemoryState>,
}

impl MemoryGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, CardGraphError> {
        self.state
            .lock()
            .map_err(|_| CardGraphError::Store("memory graph lock poisoned".to_string()))
    }

    /// Properties of a node, if it exists.
    pub fn node_properties(&self, id: NodeId) -> Result<Option<Record>, CardGraphError> {
        Ok(self.state()?.nodes.get(&id).map(|n| n.properties.clone()))
    }

    /// All relationships of `rel_type`, in creation order.
    pub fn relationships(&self, rel_type: &str) -> Result<Vec<StoredRelationship>, CardGraphError> {
        Ok(self
            .state()?
            .relationships
            .values()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect())
    }
}

impl GraphStore for MemoryGraph {
    fn merge_node(
        &self,
        label: &str,
        key: &str,
        properties: &Record,
    ) -> Result<NodeId, CardGraphError> {
        let encoded = merge_key(key, properties)?;
        let mut state = self.state()?;

        let index_key = (label.to_string(), key.to_string(), encoded.clone());
        if let Some(&id) = state.key_index.get(&index_key) {
            if let Some(node) = state.nodes.get_mut(&id) {
                node.properties = properties.clone();
            }
            return Ok(id);
        }

        let id = NodeId(state.next_node_id);
        state.next_node_id = state.next_node_id.saturating_add(1);
        state.nodes.insert(
            id,
            StoredNode {
                label: label.to_string(),
                primary_key: key.to_string(),
                key: encoded,
                properties: properties.clone(),
            },
        );
        state.key_index.insert(index_key, id);
        Ok(id)
    }

    fn find_node(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<NodeId>, CardGraphError> {
        let index_key = (label.to_string(), key.to_string(), value.key_string());
        Ok(self.state()?.key_index.get(&index_key).copied())
    }

    fn create_relationship(
        &self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
        properties: &Record,
    ) -> Result<(), CardGraphError> {
        let mut state = self.state()?;
        if !state.nodes.contains_key(&from) || !state.nodes.contains_key(&to) {
            return Err(CardGraphError::Store(format!(
                "relationship endpoint missing: {:?} -> {:?}",
                from, to
            )));
        }

        let rel = StoredRelationship {
            from,
            to,
            rel_type: rel_type.to_string(),
            properties: properties.clone(),
        };
        if let Some(entry) = state.unique_entry(&rel) {
            if state.unique_values.contains(&entry) {
                return Err(CardGraphError::ConstraintViolation(format!(
                    "{} already has {}",
                    entry.0, entry.1
                )));
            }
            state.unique_values.insert(entry);
        }

        let id = state.next_relationship_id;
        state.next_relationship_id = state.next_relationship_id.saturating_add(1);
        state.relationships.insert(id, rel);
        Ok(())
    }

    fn label_exists(&self, label: &str) -> Result<bool, CardGraphError> {
        Ok(self.state()?.nodes.values().any(|n| n.label == label))
    }

    fn relationship_exists(
        &self,
        from_label: &str,
        rel_type: &str,
        to_label: &str,
    ) -> Result<bool, CardGraphError> {
        let state = self.state()?;
        Ok(state.relationships.values().any(|r| {
            r.rel_type == rel_type
                && state.label_of(r.from) == Some(from_label)
                && state.label_of(r.to) == Some(to_label)
        }))
    }

    fn delete_label(&self, label: &str) -> Result<usize, CardGraphError> {
        let mut state = self.state()?;

        let doomed_nodes: BTreeSet<NodeId> = state
            .nodes
            .iter()
            .filter(|(_, n)| n.label == label)
            .map(|(id, _)| *id)
            .collect();
        let doomed_rels: Vec<u64> = state
            .relationships
            .iter()
            .filter(|(_, r)| doomed_nodes.contains(&r.from) || doomed_nodes.contains(&r.to))
            .map(|(id, _)| *id)
            .collect();

        state.remove_relationships(&doomed_rels);
        for id in &doomed_nodes {
            state.nodes.remove(id);
        }
        state.key_index.retain(|_, id| !doomed_nodes.contains(id));
        Ok(doomed_nodes.len())
    }

    fn delete_relationships(
        &self,
        from_label: &str,
        to_label: &str,
    ) -> Result<usize, CardGraphError> {
        let mut state = self.state()?;
        let doomed: Vec<u64> = state
            .relationships
            .iter()
            .filter(|(_, r)| {
                let a = state.label_of(r.from);
                let b = state.label_of(r.to);
                (a == Some(from_label) && b == Some(to_label))
                    || (a == Some(to_label) && b == Some(from_label))
            })
            .map(|(id, _)| *id)
            .collect();
        state.remove_relationships(&doomed);
        Ok(doomed.len())
    }

    fn create_relationship_constraint(
        &self,
        rel_type: &str,
        property: &str,
    ) -> Result<(), CardGraphError> {
        let mut state = self.state()?;
        if state.constraints.contains_key(rel_type) {
            return Err(CardGraphError::Store(format!(
                "constraint on {} already exists",
                rel_type
            )));
        }

        let mut seen = BTreeSet::new();
        for rel in state.relationships.values().filter(|r| r.rel_type == rel_type) {
            if let Some(value) = rel.properties.get(property)
                && !seen.insert((rel_type.to_string(), value.key_string()))
            {
                return Err(CardGraphError::ConstraintViolation(format!(
                    "existing {} relationships share {}",
                    rel_type, property
                )));
            }
        }

        state
            .constraints
            .insert(rel_type.to_string(), property.to_string());
        state.unique_values.extend(seen);
        Ok(())
    }

    fn node_count(&self, label: &str) -> Result<usize, CardGraphError> {
        Ok(self
            .state()?
            .nodes
            .values()
            .filter(|n| n.label == label)
            .count())
    }

    fn relationship_count(&self, rel_type: &str) -> Result<usize, CardGraphError> {
        Ok(self
            .state()?
            .relationships
            .values()
            .filter(|r| r.rel_type == rel_type)
            .count())
    }
}

// =============================================================================
// TESTS
// =============================================================================
