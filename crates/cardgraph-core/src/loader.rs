//! # Node Loader
//!
//! Upserts one entity set into a graph store as labelled nodes.
//!
//! Loading is best-effort per row: a failed merge is counted and logged,
//! and the loader moves on to the next record. Uniqueness is the store's
//! job (`GraphStore::merge_node`), so two loaders may run at once.

use crate::entities::EntitySet;
use crate::graph::GraphStore;
use serde::Serialize;

/// Outcome of loading one entity set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub label: String,
    /// Rows merged into the store (created or updated).
    pub merged: usize,
    /// Rows whose merge failed.
    pub failed: usize,
}

/// Merge every record of `entities` into `store`, keyed on its primary key.
pub fn load_nodes(store: &dyn GraphStore, entities: &EntitySet) -> LoadReport {
    let mut report = LoadReport {
        label: entities.label.clone(),
        ..LoadReport::default()
    };

    tracing::info!(
        label = %entities.label,
        rows = entities.records.len(),
        "loading nodes"
    );

    for record in entities.records.rows() {
        match store.merge_node(&entities.label, &entities.primary_key, record) {
            Ok(_) => report.merged += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    label = %entities.label,
                    key = ?record.get(&entities.primary_key),
                    error = %e,
                    "node merge failed"
                );
            }
        }
    }

    tracing::info!(
        label = %report.label,
        merged = report.merged,
        failed = report.failed,
        "loaded nodes"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RecordSet;
    use crate::graph::MemoryGraph;
    use crate::{Record, Value};

    fn customers(cards: &[i64]) -> EntitySet {
        let columns = vec!["cc_num".to_string(), "city".to_string()];
        let rows = cards
            .iter()
            .map(|c| {
                [("cc_num", Value::Integer(*c)), ("city", Value::text("Oslo"))]
                    .into_iter()
                    .collect::<Record>()
            })
            .collect();
        EntitySet::new("Customer", "cc_num", RecordSet::from_rows(columns, rows))
    }

    #[test]
    fn loading_twice_does_not_duplicate() {
        let graph = MemoryGraph::new();
        let set = customers(&[1, 2, 3]);

        let first = load_nodes(&graph, &set);
        let second = load_nodes(&graph, &set);

        assert_eq!(first.merged, 3);
        assert_eq!(second.merged, 3);
        assert_eq!(graph.node_count("Customer").expect("count"), 3);
    }

    #[test]
    fn rows_without_key_are_counted_as_failed() {
        let graph = MemoryGraph::new();
        let columns = vec!["cc_num".to_string(), "city".to_string()];
        let rows = vec![
            [("cc_num", Value::Integer(1))].into_iter().collect::<Record>(),
            [("city", Value::text("Rome"))].into_iter().collect::<Record>(),
        ];
        let set = EntitySet::new("Customer", "cc_num", RecordSet::from_rows(columns, rows));

        let report = load_nodes(&graph, &set);

        assert_eq!(report.merged, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.label, "Customer");
    }
}
