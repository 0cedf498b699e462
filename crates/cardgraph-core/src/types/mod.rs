//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the cardgraph pipeline:
//! - Store identifiers (`NodeId`)
//! - Cell values and rows (`Value`, `Record`)
//! - Error types (`CardGraphError`, `Severity`)
//!
//! ## Ordering Guarantees
//!
//! `Record` keeps its attributes in a `BTreeMap`, so the property map
//! handed to a store is identical for identical rows regardless of the
//! column order in the source file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// STORE IDENTIFIERS
// =============================================================================

/// Identifier of a node inside a graph store.
///
/// Assigned by the store on merge; only meaningful for the store that
/// returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

// =============================================================================
// VALUE
// =============================================================================

/// A single typed cell of the transaction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
}

/// Type shared by every cell of one column.
///
/// Inferred once per column: a column is numeric only if every non-empty
/// cell parses, and only finite floats count as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

fn finite_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

impl ColumnType {
    /// Narrowest type that fits every non-empty cell; all-empty is text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ty = None;
        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if ty != Some(Self::Float) && cell.parse::<i64>().is_ok() {
                ty = ty.or(Some(Self::Integer));
            } else if finite_float(cell).is_some() {
                ty = Some(Self::Float);
            } else {
                return Self::Text;
            }
        }
        ty.unwrap_or(Self::Text)
    }

    /// Convert one raw cell of a column of this type.
    ///
    /// Empty cells stay text so a missing field never turns into a number.
    #[must_use]
    pub fn parse(self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Text(String::new());
        }
        let typed = match self {
            Self::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
            Self::Float => finite_float(trimmed).map(Value::Float),
            Self::Text => None,
        };
        typed.unwrap_or_else(|| Value::Text(raw.to_string()))
    }
}

impl Value {
    /// Type a lone cell as a one-cell column.
    #[must_use]
    pub fn parse_cell(raw: &str) -> Self {
        ColumnType::infer([raw]).parse(raw)
    }

    /// Create a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get the value as a string slice if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used for the `amount` edge property.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Canonical, type-tagged encoding used as a uniqueness key by stores.
    ///
    /// `Text("42")` and `Integer(42)` are distinct keys, matching how a
    /// property graph compares values.
    #[must_use]
    pub fn key_string(&self) -> String {
        match self {
            Self::Text(s) => format!("s:{s}"),
            Self::Integer(i) => format!("i:{i}"),
            Self::Float(f) => format!("f:{:016x}", f.to_bits()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Property map of a node or relationship.
pub type Properties = BTreeMap<String, Value>;

/// One row of a record set: attribute name -> value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record(Properties);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// Set an attribute value, returning the previous one.
    pub fn insert(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(attribute.into(), value.into())
    }

    /// Remove an attribute.
    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.0.remove(attribute)
    }

    /// Keep only the attributes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|k, _| keep(k));
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attributes in deterministic (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying property map.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.0
    }
}

impl From<Properties> for Record {
    fn from(props: Properties) -> Self {
        Self(props)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// How an error affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; the run continues with the next unit or step.
    Recoverable,
    /// Logged; the process exits with a non-zero status.
    Fatal,
}

/// Errors that can occur in the cardgraph pipeline.
#[derive(Debug, Error)]
pub enum CardGraphError {
    /// The input file could not be parsed as delimited text.
    #[error("CSV error: {0}")]
    Csv(String),

    /// The input file has no header row.
    #[error("Dataset has no header row")]
    EmptyDataset,

    /// A column required by a stage is not in the dataset schema.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A transaction date did not match DD/MM/YY.
    #[error("Invalid date '{0}': expected DD/MM/YY")]
    InvalidDate(String),

    /// The store could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A store call did not finish in time.
    #[error("Store call timed out after {0} ms")]
    Timeout(u64),

    /// A write would break a uniqueness constraint.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// The worker pool could not be built.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl CardGraphError {
    /// Classify the error for the reporting collaborator.
    ///
    /// Input that cannot be read or lacks a required column, an unreachable
    /// store and bad settings are fatal.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Csv(_)
            | Self::EmptyDataset
            | Self::MissingColumn(_)
            | Self::Connection(_)
            | Self::Config(_)
            | Self::Io(_) => Severity::Fatal,
            Self::InvalidDate(_)
            | Self::Store(_)
            | Self::Timeout(_)
            | Self::ConstraintViolation(_)
            | Self::WorkerPool(_) => Severity::Recoverable,
        }
    }

    /// Shorthand for `severity() == Severity::Fatal`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

// =============================================================================
// TESTS
// =============================================================================
