//! # Error Reporting
//!
//! Every error a step returns passes through `report`: it is logged as one
//! structured record, and the caller learns whether the run may go on.

use cardgraph_core::{CardGraphError, Severity};
use serde::Serialize;

/// What the caller does after an error was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Continue with the next step.
    Continue,
    /// Stop the process with this exit code.
    Exit(i32),
}

/// Structured form of a reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub status: &'static str,
    pub detail: String,
    pub fatal: bool,
}

impl ErrorRecord {
    pub fn from_error(err: &CardGraphError) -> Self {
        let status = match err {
            CardGraphError::Csv(_) | CardGraphError::EmptyDataset => "dataset",
            CardGraphError::MissingColumn(_) => "schema",
            CardGraphError::InvalidDate(_) => "date",
            CardGraphError::Connection(_) => "connection",
            CardGraphError::Store(_) => "store",
            CardGraphError::Timeout(_) => "timeout",
            CardGraphError::ConstraintViolation(_) => "constraint",
            CardGraphError::Config(_) => "config",
            CardGraphError::Io(_) => "io",
            CardGraphError::WorkerPool(_) => "worker_pool",
        };
        Self {
            status,
            detail: err.to_string(),
            fatal: err.severity() == Severity::Fatal,
        }
    }
}

/// Log `err` for `step` and decide whether the run continues.
pub fn report(step: &str, err: &CardGraphError) -> Disposition {
    let record = ErrorRecord::from_error(err);
    tracing::error!(
        step,
        status = record.status,
        detail = %record.detail,
        fatal = record.fatal,
        "step failed"
    );
    if record.fatal {
        Disposition::Exit(1)
    } else {
        Disposition::Continue
    }
}
