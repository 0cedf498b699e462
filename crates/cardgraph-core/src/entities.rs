//! # Entity Derivation
//!
//! Derives the three normalized entity sets from the raw transaction table:
//! customers, merchants and purchase events.
//!
//! Entities are derived fresh on every run; nothing here touches a store.

use crate::dataset::RecordSet;
use crate::dates::normalize_date;
use crate::dedupe::dedupe;
use crate::primitives::{
    CARD_NUMBER, CUSTOMER_LABEL, MERCHANT_LABEL, MERCHANT_NAME, PURCHASE_COLUMNS,
    TRANSACTION_DATE, TRANSACTION_NUMBER,
};
use crate::{CardGraphError, Value};

/// A deduplicated record set bound to the label and key it is loaded under.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    /// Node label in the graph.
    pub label: String,
    /// Attribute merged on.
    pub primary_key: String,
    /// One row per distinct primary-key value.
    pub records: RecordSet,
}

impl EntitySet {
    /// Bind a record set to a label and primary key.
    #[must_use]
    pub fn new(label: impl Into<String>, primary_key: impl Into<String>, records: RecordSet) -> Self {
        Self {
            label: label.into(),
            primary_key: primary_key.into(),
            records,
        }
    }
}

/// Resolve an optional attribute list; `None` means every dataset column.
fn attribute_list<'a>(raw: &'a RecordSet, attrs: Option<&'a [String]>) -> Vec<&'a str> {
    match attrs {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => raw.columns().iter().map(String::as_str).collect(),
    }
}

/// Unique customers keyed by card number.
pub fn customers(raw: &RecordSet, attrs: Option<&[String]>) -> Result<EntitySet, CardGraphError> {
    let keep = attribute_list(raw, attrs);
    let records = dedupe(raw, CARD_NUMBER, &keep)?;
    tracing::info!(count = records.len(), "created customer record set");
    Ok(EntitySet::new(CUSTOMER_LABEL, CARD_NUMBER, records))
}

/// Unique merchants keyed by merchant name.
pub fn merchants(raw: &RecordSet, attrs: Option<&[String]>) -> Result<EntitySet, CardGraphError> {
    let keep = attribute_list(raw, attrs);
    let records = dedupe(raw, MERCHANT_NAME, &keep)?;
    tracing::info!(count = records.len(), "created merchant record set");
    Ok(EntitySet::new(MERCHANT_LABEL, MERCHANT_NAME, records))
}

/// Unique purchases keyed by transaction number, dates normalized to ISO 8601.
///
/// Every purchase column must be present; a malformed date fails the whole
/// derivation.
pub fn purchases(raw: &RecordSet) -> Result<RecordSet, CardGraphError> {
    for column in PURCHASE_COLUMNS {
        raw.require_column(column)?;
    }

    let unique = dedupe(raw, TRANSACTION_NUMBER, &PURCHASE_COLUMNS)?;

    let mut normalized = RecordSet::new(unique.columns().to_vec());
    for row in unique.rows() {
        let mut row = row.clone();
        if let Some(date) = row.get(TRANSACTION_DATE) {
            let iso = normalize_date(&date.to_string())?;
            row.insert(TRANSACTION_DATE, Value::Text(iso));
        }
        normalized.push(row);
    }

    tracing::info!(count = normalized.len(), "created purchase record set");
    Ok(normalized)
}

// =============================================================================
// TESTS
// =============================================================================
