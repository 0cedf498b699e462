//! # CLI Command Implementations
//!
//! Each command resolves its store, then runs the synchronous pipeline on a
//! blocking thread so the Neo4j backend can drive the runtime from there.

use crate::config::{Backend, Settings};
use crate::neo4j::Neo4jGraph;
use crate::report::{self, Disposition, ErrorRecord};
use cardgraph_core::{
    CardGraphError, GraphStore, LinkSummary, MemoryGraph, NodeSummary, Pipeline, Prompter,
    RedbGraph, StoreStatus, store_status,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Maximum dataset size (4 GiB).
const MAX_DATASET_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CardGraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CardGraphError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CardGraphError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve the dataset path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CardGraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        CardGraphError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CardGraphError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// STORE
// =============================================================================

/// Open the configured backend.
///
/// Must be called from inside the runtime: Neo4j keeps its handle.
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn GraphStore>, CardGraphError> {
    tracing::debug!(backend = %settings.backend, "opening store");
    let store: Arc<dyn GraphStore> = match settings.backend {
        Backend::Memory => Arc::new(MemoryGraph::new()),
        Backend::Redb => Arc::new(RedbGraph::open(&settings.database)?),
        Backend::Neo4j => Arc::new(
            Neo4jGraph::connect(&settings.neo4j, tokio::runtime::Handle::current()).await?,
        ),
    };
    Ok(store)
}

/// Run synchronous pipeline work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, CardGraphError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CardGraphError::WorkerPool(format!("pipeline thread failed: {}", e)))
}

// =============================================================================
// RUN
// =============================================================================

/// Which loading steps a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steps {
    All,
    Nodes,
    Link,
}

impl Steps {
    fn loads_nodes(self) -> bool {
        matches!(self, Self::All | Self::Nodes)
    }

    fn links(self) -> bool {
        matches!(self, Self::All | Self::Link)
    }
}

/// Everything a run did, printed at the end.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub dataset: String,
    pub backend: String,
    pub rows: usize,
    pub nodes: Option<NodeSummary>,
    pub relationships: Option<LinkSummary>,
    pub errors: Vec<ErrorRecord>,
}

/// Record a failed step; fatal errors end the run.
fn step_failed(
    step: &str,
    err: CardGraphError,
    errors: &mut Vec<ErrorRecord>,
) -> Result<(), CardGraphError> {
    if err.is_fatal() {
        return Err(err);
    }
    if report::report(step, &err) == Disposition::Continue {
        errors.push(ErrorRecord::from_error(&err));
    }
    Ok(())
}

/// The synchronous part of a run.
pub fn run_steps(
    dataset: &Path,
    store: Arc<dyn GraphStore>,
    settings: &Settings,
    prompter: &dyn Prompter,
    steps: Steps,
) -> Result<RunReport, CardGraphError> {
    tracing::info!(path = %dataset.display(), "reading dataset");
    let pipeline = Pipeline::from_csv(dataset, store, settings.options.clone())?;

    let mut report = RunReport {
        dataset: dataset.display().to_string(),
        backend: settings.backend.to_string(),
        rows: pipeline.context().dataset.len(),
        nodes: None,
        relationships: None,
        errors: Vec::new(),
    };

    if steps.loads_nodes() {
        match pipeline.load_customer_merchant(&settings.attributes, prompter) {
            Ok(summary) => report.nodes = Some(summary),
            Err(e) => step_failed("nodes", e, &mut report.errors)?,
        }
    }

    if steps.links() {
        match pipeline.create_relationships(&settings.relation, prompter) {
            Ok(summary) => report.relationships = Some(summary),
            Err(e) => step_failed("relationships", e, &mut report.errors)?,
        }
    }

    Ok(report)
}

/// Load the dataset into the configured store.
pub async fn cmd_run(
    settings: Settings,
    prompter: Box<dyn Prompter + Send>,
    steps: Steps,
    json_mode: bool,
) -> Result<(), CardGraphError> {
    let dataset = validate_file_path(&settings.dataset)?;
    validate_file_size(&dataset, MAX_DATASET_FILE_SIZE)?;

    let store = open_store(&settings).await?;
    let report = blocking(move || {
        run_steps(&dataset, store, &settings, prompter.as_ref(), steps)
    })
    .await??;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
        return Ok(());
    }

    print_run_report(&report);
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("cardgraph Load Summary");
    println!("======================");
    println!("Dataset:  {}", report.dataset);
    println!("Backend:  {}", report.backend);
    println!("Rows:     {}", report.rows);

    if let Some(nodes) = &report.nodes {
        println!();
        println!("Nodes ({:?})", nodes.guard);
        for load in &nodes.loads {
            println!("  {:<10} merged {:>8}  failed {:>6}", load.label, load.merged, load.failed);
        }
        for unit in &nodes.failed_units {
            println!("  unit {} failed: {}", unit.name, unit.error);
        }
    }

    if let Some(links) = &report.relationships {
        println!();
        println!("Relationships :{} ({:?})", links.rel_type, links.guard);
        println!("  Batches:          {}", links.batches);
        println!("  Created:          {}", links.created);
        println!("  Missing endpoint: {}", links.missing_endpoint);
        println!("  Failed:           {}", links.failed);
        for unit in &links.failed_units {
            println!("  unit {} failed: {}", unit.name, unit.error);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors");
        for err in &report.errors {
            println!("  [{}] {}", err.status, err.detail);
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Show node and relationship counts of the configured store.
pub async fn cmd_status(settings: Settings, json_mode: bool) -> Result<(), CardGraphError> {
    let store = open_store(&settings).await?;
    let relation = settings.relation.clone();
    let status: StoreStatus = blocking(move || store_status(store.as_ref(), &relation)).await??;

    if json_mode {
        let output = serde_json::json!({
            "backend": settings.backend.to_string(),
            "customers": status.customers,
            "merchants": status.merchants,
            "rel_type": status.rel_type,
            "relationships": status.relationships,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("cardgraph Store Status");
    println!("======================");
    println!("Backend:       {}", settings.backend);
    println!("Customers:     {}", status.customers);
    println!("Merchants:     {}", status.merchants);
    println!("{:<14} {}", format!(":{}", status.rel_type), status.relationships);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_dataset_is_fatal() {
        let err = validate_file_path(Path::new("/nonexistent/fraudTrain.csv")).expect_err("missing");
        assert!(err.is_fatal());
    }

    #[test]
    fn directory_is_not_a_dataset() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_file_path(dir.path()).is_err());
    }

    #[test]
    fn oversized_dataset_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"cc_num\n1\n").expect("write");
        assert!(validate_file_size(file.path(), 4).is_err());
        assert!(validate_file_size(file.path(), 1024).is_ok());
    }

    #[test]
    fn recoverable_step_errors_are_recorded() {
        let mut errors = Vec::new();
        step_failed("relationships", CardGraphError::InvalidDate("x".into()), &mut errors)
            .expect("continues");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status, "date");
    }

    #[test]
    fn fatal_step_errors_stop_the_run() {
        let mut errors = Vec::new();
        let result = step_failed("nodes", CardGraphError::Csv("bad".into()), &mut errors);
        assert!(result.is_err());
        assert!(errors.is_empty());
    }
}
