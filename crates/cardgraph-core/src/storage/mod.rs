//! # Storage Backends
//!
//! Embedded, disk-backed implementations of `GraphStore`.

mod redb_graph;

pub use redb_graph::RedbGraph;
