//! # Pipeline
//!
//! Wires the stages together: derive entities, guard, then load or link on
//! the worker pool.
//!
//! ## Architecture
//!
//! All run state lives in an immutable `PipelineContext` (dataset, store,
//! options). The `Pipeline` adds only the reusable worker pool, so each step
//! can be run on its own and in any order.

use crate::batch::partition;
use crate::dataset::RecordSet;
use crate::entities::{customers, merchants, purchases};
use crate::graph::GraphStore;
use crate::guard::{GuardOutcome, Prompter, check_nodes, check_relationship};
use crate::linker::{BatchReport, link_batch};
use crate::loader::{LoadReport, load_nodes};
use crate::pool::{Unit, UnitOutcome, WorkerPool};
use crate::primitives::{
    BATCH_SIZE, CUSTOMER_LABEL, DEFAULT_CUSTOMER_ATTRIBUTES, DEFAULT_MERCHANT_ATTRIBUTES,
    MAX_PROMPT_ATTEMPTS, MERCHANT_LABEL,
};
use crate::CardGraphError;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tunables of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Purchase rows per linking batch.
    pub batch_size: usize,
    /// Worker threads in the pool.
    pub workers: usize,
    /// Operator prompt attempts before a guard gives up and skips.
    pub max_prompt_attempts: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            max_prompt_attempts: MAX_PROMPT_ATTEMPTS,
        }
    }
}

/// Attributes projected into each entity; `None` keeps every column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    pub customer: Option<Vec<String>>,
    pub merchant: Option<Vec<String>>,
}

impl AttributeMap {
    /// The customer and merchant attributes of the card transaction dataset.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            customer: Some(DEFAULT_CUSTOMER_ATTRIBUTES.iter().map(|s| s.to_string()).collect()),
            merchant: Some(DEFAULT_MERCHANT_ATTRIBUTES.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Everything a stage needs, shared read-only by all workers.
#[derive(Clone)]
pub struct PipelineContext {
    pub dataset: Arc<RecordSet>,
    pub store: Arc<dyn GraphStore>,
    pub options: PipelineOptions,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("rows", &self.dataset.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SUMMARIES
// =============================================================================

/// A unit that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub name: String,
    pub error: String,
}

/// Split outcomes into values and failures.
fn split_outcomes<T>(outcomes: Vec<UnitOutcome<T>>) -> (Vec<T>, Vec<UnitFailure>) {
    let mut values = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(value) => values.push(value),
            Err(error) => failures.push(UnitFailure {
                name: outcome.name,
                error,
            }),
        }
    }
    (values, failures)
}

/// Result of the node loading step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub guard: GuardOutcome,
    pub loads: Vec<LoadReport>,
    pub failed_units: Vec<UnitFailure>,
}

impl NodeSummary {
    fn skipped() -> Self {
        Self {
            guard: GuardOutcome::Skip,
            loads: Vec::new(),
            failed_units: Vec::new(),
        }
    }

    /// Nodes merged across all labels.
    #[must_use]
    pub fn merged(&self) -> usize {
        self.loads.iter().map(|l| l.merged).sum()
    }

    /// Node merges that failed across all labels.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.loads.iter().map(|l| l.failed).sum()
    }
}

/// Result of the relationship linking step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub guard: GuardOutcome,
    pub rel_type: String,
    /// Batches submitted to the pool.
    pub batches: usize,
    pub created: usize,
    pub missing_endpoint: usize,
    pub failed: usize,
    pub failed_units: Vec<UnitFailure>,
}

impl LinkSummary {
    fn skipped(rel_type: &str) -> Self {
        Self {
            guard: GuardOutcome::Skip,
            rel_type: rel_type.to_string(),
            batches: 0,
            created: 0,
            missing_endpoint: 0,
            failed: 0,
            failed_units: Vec::new(),
        }
    }

    /// Events that did not produce an edge.
    #[must_use]
    pub fn skipped_events(&self) -> usize {
        self.missing_endpoint + self.failed
    }
}

/// Node and relationship counts in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub customers: usize,
    pub merchants: usize,
    pub rel_type: String,
    pub relationships: usize,
}

/// Count what the pipeline has loaded into `store`.
pub fn store_status(store: &dyn GraphStore, rel_type: &str) -> Result<StoreStatus, CardGraphError> {
    Ok(StoreStatus {
        customers: store.node_count(CUSTOMER_LABEL)?,
        merchants: store.node_count(MERCHANT_LABEL)?,
        rel_type: rel_type.to_string(),
        relationships: store.relationship_count(rel_type)?,
    })
}

// =============================================================================
// PIPELINE
// =============================================================================

/// A pipeline over one dataset and one store.
#[derive(Debug)]
pub struct Pipeline {
    context: PipelineContext,
    pool: WorkerPool,
}

impl Pipeline {
    /// Build the worker pool for `context`.
    pub fn new(context: PipelineContext) -> Result<Self, CardGraphError> {
        let pool = WorkerPool::new(context.options.workers)?;
        tracing::debug!(workers = pool.workers(), "worker pool ready");
        Ok(Self { context, pool })
    }

    /// Read `path` and build a pipeline over it.
    pub fn from_csv(
        path: impl AsRef<Path>,
        store: Arc<dyn GraphStore>,
        options: PipelineOptions,
    ) -> Result<Self, CardGraphError> {
        let dataset = RecordSet::from_csv_path(path)?;
        Self::new(PipelineContext {
            dataset: Arc::new(dataset),
            store,
            options,
        })
    }

    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Derive customers and merchants and merge them as nodes.
    ///
    /// The two labels load concurrently. Returns early with a `Skip` guard
    /// when the operator keeps existing nodes.
    pub fn load_customer_merchant(
        &self,
        attrs: &AttributeMap,
        prompter: &dyn Prompter,
    ) -> Result<NodeSummary, CardGraphError> {
        let ctx = &self.context;
        let store = ctx.store.as_ref();

        tracing::info!(rows = ctx.dataset.len(), "deduplicating customers and merchants");
        let customer_set = customers(&ctx.dataset, attrs.customer.as_deref())?;
        let merchant_set = merchants(&ctx.dataset, attrs.merchant.as_deref())?;

        let guard = check_nodes(
            store,
            &[CUSTOMER_LABEL, MERCHANT_LABEL],
            prompter,
            ctx.options.max_prompt_attempts,
        )?;
        if !guard.proceeds() {
            return Ok(NodeSummary::skipped());
        }

        for set in [&customer_set, &merchant_set] {
            if let Err(e) = store.create_node_constraint(&set.label, &set.primary_key) {
                tracing::debug!(
                    label = %set.label,
                    key = %set.primary_key,
                    error = %e,
                    "node key constraint not created"
                );
            }
        }

        tracing::info!("loading customer and merchant nodes");
        let units = vec![
            Unit::new(CUSTOMER_LABEL, || Ok(load_nodes(store, &customer_set))),
            Unit::new(MERCHANT_LABEL, || Ok(load_nodes(store, &merchant_set))),
        ];
        let (loads, failed_units) = split_outcomes(self.pool.run_all(units));

        let summary = NodeSummary {
            guard,
            loads,
            failed_units,
        };
        tracing::info!(
            merged = summary.merged(),
            failed = summary.failed(),
            failed_units = summary.failed_units.len(),
            "node load finished"
        );
        Ok(summary)
    }

    /// Derive purchases and link them as `rel_type` relationships.
    ///
    /// One pool unit per batch; a failed batch is reported and does not stop
    /// the others.
    pub fn create_relationships(
        &self,
        rel_type: &str,
        prompter: &dyn Prompter,
    ) -> Result<LinkSummary, CardGraphError> {
        if rel_type.trim().is_empty() {
            return Err(CardGraphError::Config(
                "relationship type must not be empty".to_string(),
            ));
        }

        let ctx = &self.context;
        let store = ctx.store.as_ref();

        tracing::info!(rows = ctx.dataset.len(), "deduplicating purchases");
        let purchase_set = purchases(&ctx.dataset)?;

        let guard = check_relationship(
            store,
            CUSTOMER_LABEL,
            rel_type,
            MERCHANT_LABEL,
            prompter,
            ctx.options.max_prompt_attempts,
        )?;
        if !guard.proceeds() {
            return Ok(LinkSummary::skipped(rel_type));
        }

        let batches = partition(&purchase_set, ctx.options.batch_size);
        tracing::info!(
            purchases = purchase_set.len(),
            batches = batches.len(),
            rel_type,
            "creating relationships"
        );

        let units: Vec<Unit<'_, BatchReport>> = batches
            .iter()
            .map(|batch| {
                Unit::new(format!("batch-{}", batch.index), move || {
                    Ok(link_batch(store, batch, rel_type))
                })
            })
            .collect();
        let batch_count = units.len();
        let (reports, failed_units) = split_outcomes(self.pool.run_all(units));

        let summary = LinkSummary {
            guard,
            rel_type: rel_type.to_string(),
            batches: batch_count,
            created: reports.iter().map(|r| r.created).sum(),
            missing_endpoint: reports.iter().map(|r| r.missing_endpoint).sum(),
            failed: reports.iter().map(|r| r.failed).sum(),
            failed_units,
        };
        tracing::info!(
            created = summary.created,
            skipped = summary.skipped_events(),
            failed_units = summary.failed_units.len(),
            "relationship load finished"
        );
        Ok(summary)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::guard::FixedPrompter;

    const SAMPLE: &str = "\
cc_num,first,last,gender,zip,state,job,city,merchant,category,amt,trans_date,trans_time,trans_num,unix_time
4001,Jane,Doe,F,10001,NY,Nurse,New York,fraud_Kirlin,food,12.50,21/05/23,10:00:00,t1,1684663200
4001,Jane,Doe,F,10001,NY,Nurse,New York,fraud_Sporer,travel,80,22/05/23,11:30:00,t2,1684755000
4002,John,Roe,M,94105,CA,Chef,San Francisco,fraud_Kirlin,food,3.10,22/05/23,12:00:00,t3,1684756800
";

    fn pipeline(batch_size: usize) -> (Pipeline, Arc<MemoryGraph>) {
        let graph = Arc::new(MemoryGraph::new());
        let dataset = RecordSet::from_csv_reader(SAMPLE.as_bytes()).expect("parse");
        let context = PipelineContext {
            dataset: Arc::new(dataset),
            store: graph.clone(),
            options: PipelineOptions {
                batch_size,
                workers: 2,
                max_prompt_attempts: 3,
            },
        };
        (Pipeline::new(context).expect("pipeline"), graph)
    }

    #[test]
    fn full_run_loads_nodes_and_edges() {
        let (pipeline, graph) = pipeline(2);
        let prompter = FixedPrompter::no();

        let nodes = pipeline
            .load_customer_merchant(&AttributeMap::standard(), &prompter)
            .expect("nodes");
        let links = pipeline
            .create_relationships("MADE_PURCHASE_AT", &prompter)
            .expect("links");

        assert_eq!(nodes.guard, GuardOutcome::Fresh);
        assert_eq!(nodes.merged(), 4);
        assert!(nodes.failed_units.is_empty());
        assert_eq!(links.batches, 2);
        assert_eq!(links.created, 3);
        assert_eq!(links.skipped_events(), 0);

        let status = store_status(graph.as_ref(), "MADE_PURCHASE_AT").expect("status");
        assert_eq!(status.customers, 2);
        assert_eq!(status.merchants, 2);
        assert_eq!(status.relationships, 3);
    }

    #[test]
    fn declined_rerun_leaves_store_unchanged() {
        let (pipeline, graph) = pipeline(10);
        let no = FixedPrompter::no();
        pipeline.load_customer_merchant(&AttributeMap::standard(), &no).expect("nodes");
        pipeline.create_relationships("MADE_PURCHASE_AT", &no).expect("links");

        let nodes = pipeline
            .load_customer_merchant(&AttributeMap::standard(), &no)
            .expect("nodes again");
        let links = pipeline
            .create_relationships("MADE_PURCHASE_AT", &no)
            .expect("links again");

        assert_eq!(nodes.guard, GuardOutcome::Skip);
        assert_eq!(links.guard, GuardOutcome::Skip);
        assert_eq!(graph.relationship_count("MADE_PURCHASE_AT").expect("count"), 3);
    }

    #[test]
    fn confirmed_rerun_relinks_without_duplicates() {
        let (pipeline, graph) = pipeline(10);
        pipeline
            .load_customer_merchant(&AttributeMap::standard(), &FixedPrompter::no())
            .expect("nodes");
        pipeline
            .create_relationships("MADE_PURCHASE_AT", &FixedPrompter::no())
            .expect("links");

        let links = pipeline
            .create_relationships("MADE_PURCHASE_AT", &FixedPrompter::yes())
            .expect("relink");

        assert_eq!(links.guard, GuardOutcome::Reset);
        assert_eq!(links.created, 3);
        assert_eq!(graph.relationship_count("MADE_PURCHASE_AT").expect("count"), 3);
    }

    /// Delegates to a `MemoryGraph`, recording constraint and merge calls.
    /// Node constraints always fail.
    struct RecordingGraph {
        inner: MemoryGraph,
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingGraph {
        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl GraphStore for RecordingGraph {
        fn merge_node(
            &self,
            label: &str,
            key: &str,
            properties: &crate::Record,
        ) -> Result<crate::NodeId, CardGraphError> {
            self.record(format!("merge:{label}"));
            self.inner.merge_node(label, key, properties)
        }

        fn find_node(
            &self,
            label: &str,
            key: &str,
            value: &crate::Value,
        ) -> Result<Option<crate::NodeId>, CardGraphError> {
            self.inner.find_node(label, key, value)
        }

        fn create_relationship(
            &self,
            from: crate::NodeId,
            rel_type: &str,
            to: crate::NodeId,
            properties: &crate::Record,
        ) -> Result<(), CardGraphError> {
            self.inner.create_relationship(from, rel_type, to, properties)
        }

        fn label_exists(&self, label: &str) -> Result<bool, CardGraphError> {
            self.inner.label_exists(label)
        }

        fn relationship_exists(
            &self,
            from_label: &str,
            rel_type: &str,
            to_label: &str,
        ) -> Result<bool, CardGraphError> {
            self.inner.relationship_exists(from_label, rel_type, to_label)
        }

        fn delete_label(&self, label: &str) -> Result<usize, CardGraphError> {
            self.inner.delete_label(label)
        }

        fn delete_relationships(
            &self,
            from_label: &str,
            to_label: &str,
        ) -> Result<usize, CardGraphError> {
            self.inner.delete_relationships(from_label, to_label)
        }

        fn create_relationship_constraint(
            &self,
            rel_type: &str,
            property: &str,
        ) -> Result<(), CardGraphError> {
            self.inner.create_relationship_constraint(rel_type, property)
        }

        fn create_node_constraint(&self, label: &str, key: &str) -> Result<(), CardGraphError> {
            self.record(format!("constraint:{label}.{key}"));
            Err(CardGraphError::Store("constraints unsupported".to_string()))
        }

        fn node_count(&self, label: &str) -> Result<usize, CardGraphError> {
            self.inner.node_count(label)
        }

        fn relationship_count(&self, rel_type: &str) -> Result<usize, CardGraphError> {
            self.inner.relationship_count(rel_type)
        }
    }

    #[test]
    fn node_key_constraints_precede_merges() {
        let graph = Arc::new(RecordingGraph {
            inner: MemoryGraph::new(),
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let dataset = RecordSet::from_csv_reader(SAMPLE.as_bytes()).expect("parse");
        let pipeline = Pipeline::new(PipelineContext {
            dataset: Arc::new(dataset),
            store: graph.clone(),
            options: PipelineOptions {
                batch_size: 10,
                workers: 2,
                max_prompt_attempts: 3,
            },
        })
        .expect("pipeline");

        let summary = pipeline
            .load_customer_merchant(&AttributeMap::standard(), &FixedPrompter::no())
            .expect("constraint failure is not an error");

        let calls = graph.calls();
        assert_eq!(calls[0], "constraint:Customer.cc_num");
        assert_eq!(calls[1], "constraint:Merchant.merchant");
        assert!(calls[2..].iter().all(|c| c.starts_with("merge:")));
        assert_eq!(summary.merged(), 4);
        assert_eq!(graph.node_count("Customer").expect("count"), 2);
    }

    #[test]
    fn empty_relation_type_is_rejected() {
        let (pipeline, _) = pipeline(10);
        let result = pipeline.create_relationships(" ", &FixedPrompter::no());
        assert!(matches!(result, Err(CardGraphError::Config(_))));
    }

    #[test]
    fn attribute_lists_narrow_projection() {
        let (pipeline, _) = pipeline(10);
        let attrs = AttributeMap {
            customer: Some(vec!["first".to_string()]),
            merchant: None,
        };

        let summary = pipeline
            .load_customer_merchant(&attrs, &FixedPrompter::no())
            .expect("nodes");
        assert_eq!(summary.merged(), 4);
    }
}
