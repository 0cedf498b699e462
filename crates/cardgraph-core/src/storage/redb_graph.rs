//! # redb-backed Graph Storage
//!
//! A disk-backed `GraphStore` using the redb embedded database.
//!
//! - ACID transactions (one per store call)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! redb serializes write transactions, so a merge reads the key index and
//! writes the node inside one transaction: two workers merging the same key
//! can never both create a node.

use crate::graph::{GraphStore, StoredNode, StoredRelationship, merge_key};
use crate::{CardGraphError, NodeId, Record, Value};
use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;

/// Table for nodes: NodeId(u64) -> serialized StoredNode bytes
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for the merge index: (label, key attribute, encoded value) -> NodeId
const NODE_KEYS: TableDefinition<(&str, &str, &str), u64> = TableDefinition::new("node_keys");

/// Table for relationships: id -> serialized StoredRelationship bytes
const RELATIONSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("relationships");

/// Table for relationship constraints: rel_type -> unique property
const CONSTRAINTS: TableDefinition<&str, &str> = TableDefinition::new("constraints");

/// Table for constrained values: (rel_type, encoded value) -> relationship id
const UNIQUE_VALUES: TableDefinition<(&str, &str), u64> = TableDefinition::new("unique_values");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_NODE_ID: &str = "next_node_id";
const NEXT_RELATIONSHIP_ID: &str = "next_relationship_id";

fn store_err(e: impl std::fmt::Display) -> CardGraphError {
    CardGraphError::Store(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CardGraphError> {
    postcard::to_allocvec(value).map_err(store_err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CardGraphError> {
    postcard::from_bytes(bytes).map_err(store_err)
}

/// Allocate the next id from a metadata counter.
fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, CardGraphError> {
    let mut meta = txn.open_table(METADATA).map_err(store_err)?;
    let id = meta
        .get(counter)
        .map_err(store_err)?
        .map(|v| v.value())
        .unwrap_or(0);
    meta.insert(counter, id.saturating_add(1))
        .map_err(store_err)?;
    Ok(id)
}

/// Remove relationships and release their constrained values.
fn remove_relationships(txn: &WriteTransaction, doomed: &[u64]) -> Result<(), CardGraphError> {
    let mut rels = txn.open_table(RELATIONSHIPS).map_err(store_err)?;
    let constraints = txn.open_table(CONSTRAINTS).map_err(store_err)?;
    let mut unique = txn.open_table(UNIQUE_VALUES).map_err(store_err)?;

    for id in doomed {
        let removed = rels.remove(*id).map_err(store_err)?;
        let Some(bytes) = removed else {
            continue;
        };
        let rel: StoredRelationship = decode(bytes.value())?;
        let property = constraints
            .get(rel.rel_type.as_str())
            .map_err(store_err)?
            .map(|p| p.value().to_string());
        if let Some(property) = property
            && let Some(value) = rel.properties.get(&property)
        {
            unique
                .remove((rel.rel_type.as_str(), value.key_string().as_str()))
                .map_err(store_err)?;
        }
    }
    Ok(())
}

/// A disk-backed graph store using redb.
pub struct RedbGraph {
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    ///
    /// Failure to open is a connection error: the store is unreachable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CardGraphError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| CardGraphError::Connection(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(store_err)?;
            write_txn.open_table(NODES).map_err(store_err)?;
            write_txn.open_table(NODE_KEYS).map_err(store_err)?;
            write_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
            write_txn.open_table(CONSTRAINTS).map_err(store_err)?;
            write_txn.open_table(UNIQUE_VALUES).map_err(store_err)?;
            write_txn.open_table(METADATA).map_err(store_err)?;
            write_txn.commit().map_err(store_err)?;
        }

        Ok(Self { db })
    }

    /// Properties of a node, if it exists.
    pub fn node_properties(&self, id: NodeId) -> Result<Option<Record>, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let nodes = read_txn.open_table(NODES).map_err(store_err)?;
        match nodes.get(id.0).map_err(store_err)? {
            Some(bytes) => {
                let node: StoredNode = decode(bytes.value())?;
                Ok(Some(node.properties))
            }
            None => Ok(None),
        }
    }

    /// All relationships of `rel_type`, in creation order.
    pub fn relationships(&self, rel_type: &str) -> Result<Vec<StoredRelationship>, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let rels = read_txn.open_table(RELATIONSHIPS).map_err(store_err)?;

        let mut out = Vec::new();
        for entry in rels.iter().map_err(store_err)? {
            let (_, bytes) = entry.map_err(store_err)?;
            let rel: StoredRelationship = decode(bytes.value())?;
            if rel.rel_type == rel_type {
                out.push(rel);
            }
        }
        Ok(out)
    }

    /// Node ids carrying `label`, read from the merge index.
    fn label_nodes(
        keys: &impl ReadableTable<(&'static str, &'static str, &'static str), u64>,
        label: &str,
    ) -> Result<Vec<(String, String, u64)>, CardGraphError> {
        let mut out = Vec::new();
        for entry in keys.range((label, "", "")..).map_err(store_err)? {
            let (key, value) = entry.map_err(store_err)?;
            let (node_label, attribute, encoded) = key.value();
            if node_label != label {
                break;
            }
            out.push((attribute.to_string(), encoded.to_string(), value.value()));
        }
        Ok(out)
    }
}

// =============================================================================
// GRAPHSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl GraphStore for RedbGraph {
    fn merge_node(
        &self,
        label: &str,
        key: &str,
        properties: &Record,
    ) -> Result<NodeId, CardGraphError> {
        let encoded = merge_key(key, properties)?;
        let write_txn = self.db.begin_write().map_err(store_err)?;

        let id = {
            let mut keys = write_txn.open_table(NODE_KEYS).map_err(store_err)?;
            let existing = keys
                .get((label, key, encoded.as_str()))
                .map_err(store_err)?
                .map(|v| v.value());

            let id = match existing {
                Some(id) => id,
                None => {
                    let id = next_id(&write_txn, NEXT_NODE_ID)?;
                    keys.insert((label, key, encoded.as_str()), id)
                        .map_err(store_err)?;
                    id
                }
            };

            let node = StoredNode {
                label: label.to_string(),
                primary_key: key.to_string(),
                key: encoded.clone(),
                properties: properties.clone(),
            };
            let bytes = encode(&node)?;
            let mut nodes = write_txn.open_table(NODES).map_err(store_err)?;
            nodes.insert(id, bytes.as_slice()).map_err(store_err)?;
            id
        };

        write_txn.commit().map_err(store_err)?;
        Ok(NodeId(id))
    }

    fn find_node(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<NodeId>, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let keys = read_txn.open_table(NODE_KEYS).map_err(store_err)?;
        let encoded = value.key_string();
        Ok(keys
            .get((label, key, encoded.as_str()))
            .map_err(store_err)?
            .map(|v| NodeId(v.value())))
    }

    fn create_relationship(
        &self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
        properties: &Record,
    ) -> Result<(), CardGraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let nodes = write_txn.open_table(NODES).map_err(store_err)?;
            for endpoint in [from, to] {
                if nodes.get(endpoint.0).map_err(store_err)?.is_none() {
                    return Err(CardGraphError::Store(format!(
                        "relationship endpoint missing: {:?}",
                        endpoint
                    )));
                }
            }
        }

        let id = next_id(&write_txn, NEXT_RELATIONSHIP_ID)?;

        {
            let constraints = write_txn.open_table(CONSTRAINTS).map_err(store_err)?;
            let property = constraints
                .get(rel_type)
                .map_err(store_err)?
                .map(|p| p.value().to_string());

            if let Some(property) = property
                && let Some(value) = properties.get(&property)
            {
                let encoded = value.key_string();
                let mut unique = write_txn.open_table(UNIQUE_VALUES).map_err(store_err)?;
                if unique
                    .get((rel_type, encoded.as_str()))
                    .map_err(store_err)?
                    .is_some()
                {
                    return Err(CardGraphError::ConstraintViolation(format!(
                        "{} already has {} = {}",
                        rel_type, property, value
                    )));
                }
                unique
                    .insert((rel_type, encoded.as_str()), id)
                    .map_err(store_err)?;
            }
        }

        let rel = StoredRelationship {
            from,
            to,
            rel_type: rel_type.to_string(),
            properties: properties.clone(),
        };
        let bytes = encode(&rel)?;
        {
            let mut rels = write_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
            rels.insert(id, bytes.as_slice()).map_err(store_err)?;
        }

        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn label_exists(&self, label: &str) -> Result<bool, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let keys = read_txn.open_table(NODE_KEYS).map_err(store_err)?;
        let mut range = keys.range((label, "", "")..).map_err(store_err)?;
        match range.next() {
            Some(entry) => {
                let (key, _) = entry.map_err(store_err)?;
                Ok(key.value().0 == label)
            }
            None => Ok(false),
        }
    }

    fn relationship_exists(
        &self,
        from_label: &str,
        rel_type: &str,
        to_label: &str,
    ) -> Result<bool, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let rels = read_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
        let nodes = read_txn.open_table(NODES).map_err(store_err)?;

        let label_of = |id: NodeId| -> Result<Option<String>, CardGraphError> {
            match nodes.get(id.0).map_err(store_err)? {
                Some(bytes) => Ok(Some(decode::<StoredNode>(bytes.value())?.label)),
                None => Ok(None),
            }
        };

        for entry in rels.iter().map_err(store_err)? {
            let (_, bytes) = entry.map_err(store_err)?;
            let rel: StoredRelationship = decode(bytes.value())?;
            if rel.rel_type == rel_type
                && label_of(rel.from)?.as_deref() == Some(from_label)
                && label_of(rel.to)?.as_deref() == Some(to_label)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn delete_label(&self, label: &str) -> Result<usize, CardGraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;

        let doomed_nodes = {
            let mut keys = write_txn.open_table(NODE_KEYS).map_err(store_err)?;
            let entries = Self::label_nodes(&keys, label)?;
            for (attribute, encoded, _) in &entries {
                keys.remove((label, attribute.as_str(), encoded.as_str()))
                    .map_err(store_err)?;
            }
            entries
                .into_iter()
                .map(|(_, _, id)| id)
                .collect::<BTreeSet<u64>>()
        };

        let doomed_rels = {
            let rels = write_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
            let mut ids = Vec::new();
            for entry in rels.iter().map_err(store_err)? {
                let (key, bytes) = entry.map_err(store_err)?;
                let rel: StoredRelationship = decode(bytes.value())?;
                if doomed_nodes.contains(&rel.from.0) || doomed_nodes.contains(&rel.to.0) {
                    ids.push(key.value());
                }
            }
            ids
        };
        remove_relationships(&write_txn, &doomed_rels)?;

        {
            let mut nodes = write_txn.open_table(NODES).map_err(store_err)?;
            for id in &doomed_nodes {
                nodes.remove(*id).map_err(store_err)?;
            }
        }

        write_txn.commit().map_err(store_err)?;
        Ok(doomed_nodes.len())
    }

    fn delete_relationships(
        &self,
        from_label: &str,
        to_label: &str,
    ) -> Result<usize, CardGraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;

        let doomed = {
            let rels = write_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
            let nodes = write_txn.open_table(NODES).map_err(store_err)?;
            let label_of = |id: NodeId| -> Result<Option<String>, CardGraphError> {
                match nodes.get(id.0).map_err(store_err)? {
                    Some(bytes) => Ok(Some(decode::<StoredNode>(bytes.value())?.label)),
                    None => Ok(None),
                }
            };

            let mut ids = Vec::new();
            for entry in rels.iter().map_err(store_err)? {
                let (key, bytes) = entry.map_err(store_err)?;
                let rel: StoredRelationship = decode(bytes.value())?;
                let a = label_of(rel.from)?;
                let b = label_of(rel.to)?;
                let forward = a.as_deref() == Some(from_label) && b.as_deref() == Some(to_label);
                let backward = a.as_deref() == Some(to_label) && b.as_deref() == Some(from_label);
                if forward || backward {
                    ids.push(key.value());
                }
            }
            ids
        };
        remove_relationships(&write_txn, &doomed)?;

        write_txn.commit().map_err(store_err)?;
        Ok(doomed.len())
    }

    fn create_relationship_constraint(
        &self,
        rel_type: &str,
        property: &str,
    ) -> Result<(), CardGraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut constraints = write_txn.open_table(CONSTRAINTS).map_err(store_err)?;
            if constraints.get(rel_type).map_err(store_err)?.is_some() {
                return Err(CardGraphError::Store(format!(
                    "constraint on {} already exists",
                    rel_type
                )));
            }

            let rels = write_txn.open_table(RELATIONSHIPS).map_err(store_err)?;
            let mut unique = write_txn.open_table(UNIQUE_VALUES).map_err(store_err)?;
            for entry in rels.iter().map_err(store_err)? {
                let (key, bytes) = entry.map_err(store_err)?;
                let rel: StoredRelationship = decode(bytes.value())?;
                if rel.rel_type != rel_type {
                    continue;
                }
                if let Some(value) = rel.properties.get(property) {
                    let encoded = value.key_string();
                    let previous = unique
                        .insert((rel_type, encoded.as_str()), key.value())
                        .map_err(store_err)?;
                    if previous.is_some() {
                        return Err(CardGraphError::ConstraintViolation(format!(
                            "existing {} relationships share {}",
                            rel_type, property
                        )));
                    }
                }
            }

            constraints
                .insert(rel_type, property)
                .map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn node_count(&self, label: &str) -> Result<usize, CardGraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let keys = read_txn.open_table(NODE_KEYS).map_err(store_err)?;
        Ok(Self::label_nodes(&keys, label)?.len())
    }

    fn relationship_count(&self, rel_type: &str) -> Result<usize, CardGraphError> {
        Ok(self.relationships(rel_type)?.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn customer(card: i64) -> Record {
        [("cc_num", Value::Integer(card))].into_iter().collect()
    }

    fn merchant(name: &str) -> Record {
        [("merchant", Value::text(name))].into_iter().collect()
    }

    fn purchase(trans_num: &str) -> Record {
        [("trans_num", Value::text(trans_num))].into_iter().collect()
    }

    #[test]
    fn merge_is_idempotent_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("graph.redb");

        let first = {
            let graph = RedbGraph::open(&path).expect("open");
            graph.merge_node("Customer", "cc_num", &customer(1)).expect("merge")
        };

        let graph = RedbGraph::open(&path).expect("reopen");
        let second = graph.merge_node("Customer", "cc_num", &customer(1)).expect("merge");

        assert_eq!(first, second);
        assert_eq!(graph.node_count("Customer").expect("count"), 1);
    }

    #[test]
    fn label_exists_does_not_match_prefix() {
        let dir = tempdir().expect("tempdir");
        let graph = RedbGraph::open(dir.path().join("graph.redb")).expect("open");

        graph.merge_node("Customers", "cc_num", &customer(1)).expect("merge");

        assert!(!graph.label_exists("Customer").expect("exists"));
        assert!(graph.label_exists("Customers").expect("exists"));
    }

    #[test]
    fn relationship_lifecycle() {
        let dir = tempdir().expect("tempdir");
        let graph = RedbGraph::open(dir.path().join("graph.redb")).expect("open");

        let c = graph.merge_node("Customer", "cc_num", &customer(1)).expect("merge");
        let m = graph.merge_node("Merchant", "merchant", &merchant("m1")).expect("merge");
        graph.create_relationship_constraint("BOUGHT", "trans_num").expect("constraint");

        graph.create_relationship(c, "BOUGHT", m, &purchase("t1")).expect("rel");
        assert!(matches!(
            graph.create_relationship(c, "BOUGHT", m, &purchase("t1")),
            Err(CardGraphError::ConstraintViolation(_))
        ));
        assert!(graph.relationship_exists("Customer", "BOUGHT", "Merchant").expect("exists"));

        assert_eq!(graph.delete_relationships("Merchant", "Customer").expect("delete"), 1);
        assert_eq!(graph.relationship_count("BOUGHT").expect("count"), 0);
        graph.create_relationship(c, "BOUGHT", m, &purchase("t1")).expect("recreate");
    }

    #[test]
    fn delete_label_removes_nodes_and_edges() {
        let dir = tempdir().expect("tempdir");
        let graph = RedbGraph::open(dir.path().join("graph.redb")).expect("open");

        let c = graph.merge_node("Customer", "cc_num", &customer(1)).expect("merge");
        let m = graph.merge_node("Merchant", "merchant", &merchant("m1")).expect("merge");
        graph.create_relationship(c, "BOUGHT", m, &purchase("t1")).expect("rel");

        assert_eq!(graph.delete_label("Merchant").expect("delete"), 1);
        assert_eq!(graph.node_count("Merchant").expect("count"), 0);
        assert_eq!(graph.relationship_count("BOUGHT").expect("count"), 0);
        assert!(graph.node_properties(m).expect("props").is_none());
        assert!(graph.node_properties(c).expect("props").is_some());
    }

    #[test]
    fn relationship_to_missing_node_fails() {
        let dir = tempdir().expect("tempdir");
        let graph = RedbGraph::open(dir.path().join("graph.redb")).expect("open");
        let c = graph.merge_node("Customer", "cc_num", &customer(1)).expect("merge");

        assert!(graph.create_relationship(c, "BOUGHT", NodeId(99), &purchase("t1")).is_err());
    }
}
