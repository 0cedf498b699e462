//! # cardgraph-core
//!
//! The transaction-to-graph pipeline for cardgraph - THE LOGIC.
//!
//! This crate turns a flat card transaction table into a property graph:
//! customers and merchants become nodes merged on their keys, purchases
//! become relationships between them.
//!
//! ## Pipeline
//!
//! ```text
//! RecordSet ─▶ dedupe ×3 ─▶ load_nodes ×2 (pool) ─▶ guard ─▶ link_batch ×N (pool) ─▶ GraphStore
//! ```
//!
//! ## Architectural Constraints
//!
//! - No async, no network client: remote stores live in the binary
//! - Stores are reached only through `GraphStore`
//! - Node uniqueness is the store's merge, never an in-process lock
//! - A failed row, event or unit is counted and logged; it never stops its
//!   siblings

// =============================================================================
// MODULES
// =============================================================================

pub mod batch;
pub mod dataset;
pub mod dates;
pub mod dedupe;
pub mod entities;
pub mod graph;
pub mod guard;
pub mod linker;
pub mod loader;
pub mod pipeline;
pub mod pool;
pub mod primitives;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{CardGraphError, ColumnType, NodeId, Properties, Record, Severity, Value};

// =============================================================================
// RE-EXPORTS: Derivation
// =============================================================================

pub use batch::{Batch, partition};
pub use dataset::RecordSet;
pub use dates::normalize_date;
pub use dedupe::dedupe;
pub use entities::{EntitySet, customers, merchants, purchases};

// =============================================================================
// RE-EXPORTS: Stores
// =============================================================================

pub use graph::{GraphStore, MemoryGraph, StoredNode, StoredRelationship};
pub use storage::RedbGraph;

// =============================================================================
// RE-EXPORTS: Loading
// =============================================================================

pub use guard::{
    Answer, FixedPrompter, GuardOutcome, Prompter, ScriptedPrompter, check_nodes,
    check_relationship,
};
pub use linker::{BatchReport, edge_properties, link_batch};
pub use loader::{LoadReport, load_nodes};
pub use pipeline::{
    AttributeMap, LinkSummary, NodeSummary, Pipeline, PipelineContext, PipelineOptions,
    StoreStatus, UnitFailure, store_status,
};
pub use pool::{Unit, UnitOutcome, WorkerPool};
