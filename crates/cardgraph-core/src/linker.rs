//! # Batch Relationship Linker
//!
//! Turns one batch of purchase rows into customer -> merchant relationships.
//!
//! Per event: look up both endpoints, then create the edge. A missing
//! endpoint or any store error skips that event only; the rest of the batch
//! still runs.

use crate::batch::Batch;
use crate::graph::GraphStore;
use crate::primitives::{
    edge, AMOUNT, CARD_NUMBER, CUSTOMER_LABEL, MERCHANT_LABEL, MERCHANT_NAME, TRANSACTION_DATE,
    TRANSACTION_NUMBER, TRANSACTION_TIME, UNIX_TIME,
};
use crate::{CardGraphError, NodeId, Record, Value};
use serde::Serialize;

/// Outcome of linking one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Index of the batch in the partition.
    pub batch: usize,
    /// Edges created.
    pub created: usize,
    /// Events skipped because the customer or merchant was not found.
    pub missing_endpoint: usize,
    /// Events skipped because a store call failed.
    pub failed: usize,
}

impl BatchReport {
    /// Events that did not produce an edge.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.missing_endpoint + self.failed
    }
}

enum EventOutcome {
    Created,
    MissingEndpoint,
}

/// Edge properties of one purchase event.
///
/// `amount` is always a float; the other properties are copied as typed.
#[must_use]
pub fn edge_properties(event: &Record) -> Record {
    let mut props = Record::new();
    if let Some(amount) = event.get(AMOUNT) {
        match amount.as_f64() {
            Some(f) => props.insert(edge::AMOUNT, Value::Float(f)),
            None => props.insert(edge::AMOUNT, amount.clone()),
        };
    }
    let copies = [
        (TRANSACTION_DATE, edge::DATE),
        (TRANSACTION_NUMBER, edge::TRANSACTION_NUMBER),
        (TRANSACTION_TIME, edge::TIME),
        (UNIX_TIME, edge::TIMESTAMP),
    ];
    for (column, property) in copies {
        if let Some(value) = event.get(column) {
            props.insert(property, value.clone());
        }
    }
    props
}

fn lookup(
    store: &dyn GraphStore,
    label: &str,
    key: &str,
    event: &Record,
) -> Result<Option<NodeId>, CardGraphError> {
    match event.get(key) {
        Some(value) => store.find_node(label, key, value),
        None => Ok(None),
    }
}

fn link_event(
    store: &dyn GraphStore,
    event: &Record,
    rel_type: &str,
) -> Result<EventOutcome, CardGraphError> {
    let Some(customer) = lookup(store, CUSTOMER_LABEL, CARD_NUMBER, event)? else {
        return Ok(EventOutcome::MissingEndpoint);
    };
    let Some(merchant) = lookup(store, MERCHANT_LABEL, MERCHANT_NAME, event)? else {
        return Ok(EventOutcome::MissingEndpoint);
    };

    store.create_relationship(customer, rel_type, merchant, &edge_properties(event))?;
    Ok(EventOutcome::Created)
}

/// Link every event of `batch` with a `rel_type` edge.
pub fn link_batch(store: &dyn GraphStore, batch: &Batch<'_>, rel_type: &str) -> BatchReport {
    let mut report = BatchReport {
        batch: batch.index,
        ..BatchReport::default()
    };

    tracing::info!(
        batch = batch.index,
        size = batch.len(),
        first = ?batch.first_transaction(),
        last = ?batch.last_transaction(),
        "linking batch"
    );

    for event in batch.rows {
        let trans_num = event.get(TRANSACTION_NUMBER);
        match link_event(store, event, rel_type) {
            Ok(EventOutcome::Created) => report.created += 1,
            Ok(EventOutcome::MissingEndpoint) => {
                report.missing_endpoint += 1;
                tracing::debug!(trans_num = ?trans_num, "endpoint not found, event skipped");
            }
            Err(e) => {
                report.failed += 1;
                tracing::debug!(trans_num = ?trans_num, error = %e, "event skipped");
            }
        }
    }

    if report.skipped() > 0 {
        tracing::warn!(
            batch = report.batch,
            missing_endpoint = report.missing_endpoint,
            failed = report.failed,
            "batch skipped events"
        );
    }
    tracing::info!(batch = report.batch, created = report.created, "linked batch");
    report
}

// =============================================================================
// TESTS
// =============================================================================
