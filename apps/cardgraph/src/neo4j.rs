//! # Neo4j Backend
//!
//! `GraphStore` over a Neo4j server, using neo4rs.
//!
//! The pipeline is synchronous and runs on rayon workers, so every call here
//! blocks its worker on the tokio runtime through a `Handle`, bounded by the
//! configured timeout. Never call these methods from an async task.
//!
//! Labels, relationship types and property names are interpolated into
//! Cypher as backtick-quoted identifiers; values always travel as
//! parameters.
//!
//! Nodes are addressed by `elementId`, so the server must be Neo4j 5 or
//! later. Element ids are strings; each one is interned to a `NodeId` for
//! the lifetime of the connection.

use crate::config::Neo4jSettings;
use cardgraph_core::{CardGraphError, GraphStore, NodeId, Record, Value};
use neo4rs::{BoltType, Graph, Query, query};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;

// =============================================================================
// CYPHER
// =============================================================================

/// Quote a label, type or property name for Cypher.
pub fn identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn merge_node_cypher(label: &str, key: &str) -> String {
    format!(
        "MERGE (n:{} {{{}: $key}}) SET n = $props RETURN elementId(n) AS id",
        identifier(label),
        identifier(key)
    )
}

pub fn find_node_cypher(label: &str, key: &str) -> String {
    format!(
        "MATCH (n:{} {{{}: $key}}) RETURN elementId(n) AS id LIMIT 1",
        identifier(label),
        identifier(key)
    )
}

pub fn create_relationship_cypher(rel_type: &str) -> String {
    format!(
        "MATCH (a), (b) WHERE elementId(a) = $from AND elementId(b) = $to \
         CREATE (a)-[r:{}]->(b) SET r = $props RETURN count(r) AS n",
        identifier(rel_type)
    )
}

pub fn label_count_cypher(label: &str) -> String {
    format!("MATCH (n:{}) RETURN count(n) AS n", identifier(label))
}

pub fn label_exists_cypher(label: &str) -> String {
    format!(
        "MATCH (n:{}) WITH n LIMIT 1 RETURN count(n) AS n",
        identifier(label)
    )
}

pub fn relationship_exists_cypher(from_label: &str, rel_type: &str, to_label: &str) -> String {
    format!(
        "MATCH (:{})-[r:{}]->(:{}) WITH r LIMIT 1 RETURN count(r) AS n",
        identifier(from_label),
        identifier(rel_type),
        identifier(to_label)
    )
}

pub fn relationship_count_cypher(rel_type: &str) -> String {
    format!("MATCH ()-[r:{}]->() RETURN count(r) AS n", identifier(rel_type))
}

pub fn delete_label_cypher(label: &str) -> String {
    format!(
        "MATCH (n:{}) DETACH DELETE n RETURN count(n) AS n",
        identifier(label)
    )
}

pub fn delete_relationships_cypher(from_label: &str, to_label: &str) -> String {
    format!(
        "MATCH (:{})-[r]-(:{}) WITH DISTINCT r DELETE r RETURN count(r) AS n",
        identifier(from_label),
        identifier(to_label)
    )
}

pub fn relationship_constraint_cypher(rel_type: &str, property: &str) -> String {
    format!(
        "CREATE CONSTRAINT FOR ()-[r:{}]-() REQUIRE r.{} IS UNIQUE",
        identifier(rel_type),
        identifier(property)
    )
}

pub fn node_constraint_cypher(label: &str, key: &str) -> String {
    format!(
        "CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
        identifier(label),
        identifier(key)
    )
}

// =============================================================================
// VALUE CONVERSION
// =============================================================================

fn bolt(value: &Value) -> BoltType {
    match value {
        Value::Text(s) => s.clone().into(),
        Value::Integer(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
    }
}

fn bolt_map(record: &Record) -> HashMap<String, BoltType> {
    record.iter().map(|(k, v)| (k.clone(), bolt(v))).collect()
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Map a driver error, recognizing schema constraint failures.
fn classify(err: neo4rs::Error) -> CardGraphError {
    let message = err.to_string();
    if message.contains("ConstraintValidationFailed") || message.contains("already exists") {
        CardGraphError::ConstraintViolation(message)
    } else {
        CardGraphError::Store(message)
    }
}

/// Run `q` and read the integer column `column` of the first row.
async fn fetch_int(graph: &Graph, q: Query, column: &str) -> Result<Option<i64>, neo4rs::Error> {
    let mut rows = graph.execute(q).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(column).ok()),
        None => Ok(None),
    }
}

/// Run `q` and read the string column `column` of the first row.
async fn fetch_text(
    graph: &Graph,
    q: Query,
    column: &str,
) -> Result<Option<String>, neo4rs::Error> {
    let mut rows = graph.execute(q).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<String>(column).ok()),
        None => Ok(None),
    }
}

// =============================================================================
// ELEMENT IDS
// =============================================================================

/// Two-way map between server element ids and `NodeId`s.
#[derive(Debug, Default)]
struct ElementIds {
    by_element: HashMap<String, NodeId>,
    elements: Vec<String>,
}

impl ElementIds {
    fn intern(&mut self, element: String) -> NodeId {
        if let Some(id) = self.by_element.get(&element) {
            return *id;
        }
        let id = NodeId(self.elements.len() as u64);
        self.elements.push(element.clone());
        self.by_element.insert(element, id);
        id
    }

    fn element(&self, id: NodeId) -> Option<&str> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.elements.get(i))
            .map(String::as_str)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// A Neo4j server reached over Bolt.
pub struct Neo4jGraph {
    graph: Graph,
    handle: Handle,
    timeout: Duration,
    ids: Mutex<ElementIds>,
}

impl std::fmt::Debug for Neo4jGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jGraph")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Neo4jGraph {
    /// Connect and verify the server answers.
    ///
    /// Failures are `Connection` errors; a run cannot continue without its
    /// store.
    pub async fn connect(settings: &Neo4jSettings, handle: Handle) -> Result<Self, CardGraphError> {
        tracing::info!(uri = %settings.uri, user = %settings.user, "connecting to neo4j");

        let connect = async {
            let graph = Graph::new(
                settings.uri.as_str(),
                settings.user.as_str(),
                settings.password.as_str(),
            )
            .await?;
            graph.run(query("RETURN 1")).await?;
            Ok::<_, neo4rs::Error>(graph)
        };

        let graph = match tokio::time::timeout(settings.timeout, connect).await {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                return Err(CardGraphError::Connection(format!(
                    "{}: {}",
                    settings.uri, e
                )));
            }
            Err(_) => {
                return Err(CardGraphError::Connection(format!(
                    "{}: no answer within {} ms",
                    settings.uri,
                    settings.timeout.as_millis()
                )));
            }
        };

        tracing::info!(uri = %settings.uri, "connected to neo4j");
        Ok(Self {
            graph,
            handle,
            timeout: settings.timeout,
            ids: Mutex::new(ElementIds::default()),
        })
    }

    /// Block on `fut` with the call timeout.
    fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, neo4rs::Error>>,
    ) -> Result<T, CardGraphError> {
        match self
            .handle
            .block_on(async { tokio::time::timeout(self.timeout, fut).await })
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(CardGraphError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn ids(&self) -> Result<MutexGuard<'_, ElementIds>, CardGraphError> {
        self.ids
            .lock()
            .map_err(|_| CardGraphError::Store("element id table poisoned".to_string()))
    }

    fn element(&self, id: NodeId) -> Result<String, CardGraphError> {
        self.ids()?
            .element(id)
            .map(str::to_string)
            .ok_or_else(|| CardGraphError::Store(format!("unknown node id {}", id.0)))
    }

    /// Run a query returning a single `n` count.
    fn count_query(&self, cypher: String) -> Result<usize, CardGraphError> {
        let n = self.call(fetch_int(&self.graph, query(&cypher), "n"))?;
        n.map(count)
            .ok_or_else(|| CardGraphError::Store(format!("no count returned by: {}", cypher)))
    }
}

impl GraphStore for Neo4jGraph {
    fn merge_node(
        &self,
        label: &str,
        key: &str,
        properties: &Record,
    ) -> Result<NodeId, CardGraphError> {
        let key_value = properties
            .get(key)
            .ok_or_else(|| CardGraphError::MissingColumn(key.to_string()))?;
        let q = query(&merge_node_cypher(label, key))
            .param("key", bolt(key_value))
            .param("props", bolt_map(properties));

        match self.call(fetch_text(&self.graph, q, "id"))? {
            Some(element) => Ok(self.ids()?.intern(element)),
            None => Err(CardGraphError::Store(format!(
                "merge of {} {}={} returned no node",
                label, key, key_value
            ))),
        }
    }

    fn find_node(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<NodeId>, CardGraphError> {
        let q = query(&find_node_cypher(label, key)).param("key", bolt(value));
        match self.call(fetch_text(&self.graph, q, "id"))? {
            Some(element) => Ok(Some(self.ids()?.intern(element))),
            None => Ok(None),
        }
    }

    fn create_relationship(
        &self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
        properties: &Record,
    ) -> Result<(), CardGraphError> {
        let q = query(&create_relationship_cypher(rel_type))
            .param("from", self.element(from)?)
            .param("to", self.element(to)?)
            .param("props", bolt_map(properties));

        match self.call(fetch_int(&self.graph, q, "n"))? {
            Some(n) if n > 0 => Ok(()),
            _ => Err(CardGraphError::Store(format!(
                "endpoint {} or {} no longer exists",
                from.0, to.0
            ))),
        }
    }

    fn label_exists(&self, label: &str) -> Result<bool, CardGraphError> {
        Ok(self.count_query(label_exists_cypher(label))? > 0)
    }

    fn relationship_exists(
        &self,
        from_label: &str,
        rel_type: &str,
        to_label: &str,
    ) -> Result<bool, CardGraphError> {
        Ok(self.count_query(relationship_exists_cypher(from_label, rel_type, to_label))? > 0)
    }

    fn delete_label(&self, label: &str) -> Result<usize, CardGraphError> {
        let deleted = self.count_query(delete_label_cypher(label))?;
        tracing::info!(label, deleted, "deleted nodes");
        Ok(deleted)
    }

    fn delete_relationships(
        &self,
        from_label: &str,
        to_label: &str,
    ) -> Result<usize, CardGraphError> {
        let deleted = self.count_query(delete_relationships_cypher(from_label, to_label))?;
        tracing::info!(from_label, to_label, deleted, "deleted relationships");
        Ok(deleted)
    }

    fn create_relationship_constraint(
        &self,
        rel_type: &str,
        property: &str,
    ) -> Result<(), CardGraphError> {
        let cypher = relationship_constraint_cypher(rel_type, property);
        self.call(self.graph.run(query(&cypher)))
    }

    fn create_node_constraint(&self, label: &str, key: &str) -> Result<(), CardGraphError> {
        let cypher = node_constraint_cypher(label, key);
        self.call(self.graph.run(query(&cypher)))
    }

    fn node_count(&self, label: &str) -> Result<usize, CardGraphError> {
        self.count_query(label_count_cypher(label))
    }

    fn relationship_count(&self, rel_type: &str) -> Result<usize, CardGraphError> {
        self.count_query(relationship_count_cypher(rel_type))
    }
}

// =============================================================================
// TESTS
// =============================================================================
