//! # Record Deduplicator
//!
//! Reduces a record set to the first row per key value and projects it to a
//! requested attribute set.
//!
//! - First occurrence wins; input order is preserved
//! - Attributes outside the requested set are dropped
//! - The dedup key itself is always kept
//! - `first` + `last` collapse into a single `card_holder` attribute
//!
//! Applying `dedupe` to its own output with the same arguments returns the
//! same record set.

use crate::dataset::RecordSet;
use crate::primitives::{FIRST_NAME, FULL_NAME, LAST_NAME};
use crate::{CardGraphError, Value};
use std::collections::HashSet;

/// Keep the first row per distinct `key` value, projected to `keep`.
///
/// Returns `CardGraphError::MissingColumn` if `key` is not in the schema.
pub fn dedupe(records: &RecordSet, key: &str, keep: &[&str]) -> Result<RecordSet, CardGraphError> {
    records.require_column(key)?;

    let synthesize = keep.contains(&FIRST_NAME)
        && keep.contains(&LAST_NAME)
        && records.has_column(FIRST_NAME)
        && records.has_column(LAST_NAME);

    let retained = |column: &str| {
        column == key
            || (keep.contains(&column) && !(synthesize && is_name_part(column)))
            || (column == FULL_NAME && keep.contains(&FIRST_NAME) && keep.contains(&LAST_NAME))
    };

    let mut columns: Vec<String> = records
        .columns()
        .iter()
        .filter(|c| retained(c.as_str()))
        .cloned()
        .collect();
    if synthesize && !columns.iter().any(|c| c == FULL_NAME) {
        columns.push(FULL_NAME.to_string());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = RecordSet::new(columns);

    for row in records.rows() {
        let Some(key_value) = row.get(key) else {
            continue;
        };
        if !seen.insert(key_value.key_string()) {
            continue;
        }

        let mut projected = row.clone();
        if synthesize {
            let first = projected.remove(FIRST_NAME);
            let last = projected.remove(LAST_NAME);
            if let (Some(first), Some(last)) = (first, last) {
                projected.insert(FULL_NAME, Value::Text(format!("{first} {last}")));
            }
        }
        out.push(projected);
    }

    Ok(out)
}

fn is_name_part(column: &str) -> bool {
    column == FIRST_NAME || column == LAST_NAME
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RecordSet {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .iter()
            .map(|cells| {
                columns
                    .iter()
                    .zip(cells.iter())
                    .map(|(c, v)| (c.clone(), Value::parse_cell(v)))
                    .collect::<Record>()
            })
            .collect();
        RecordSet::from_rows(columns, rows)
    }

    #[test]
    fn keeps_first_row_per_key() {
        let raw = table(
            &["cc_num", "city"],
            &[&["1", "Oslo"], &["2", "Rome"], &["1", "Lima"]],
        );

        let out = dedupe(&raw, "cc_num", &["cc_num", "city"]).expect("dedupe");

        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].get("city"), Some(&Value::text("Oslo")));
        assert_eq!(out.rows()[1].get("city"), Some(&Value::text("Rome")));
    }

    #[test]
    fn drops_unrequested_attributes() {
        let raw = table(&["merchant", "category", "amt"], &[&["m1", "food", "3.5"]]);

        let out = dedupe(&raw, "merchant", &["merchant", "category"]).expect("dedupe");

        assert_eq!(out.columns(), ["merchant", "category"]);
        assert_eq!(out.rows()[0].get("amt"), None);
    }

    #[test]
    fn synthesizes_full_name() {
        let raw = table(&["cc_num", "first", "last"], &[&["1", "Jane", "Doe"]]);

        let out = dedupe(&raw, "cc_num", &["cc_num", "first", "last"]).expect("dedupe");

        let row = &out.rows()[0];
        assert_eq!(row.get("card_holder"), Some(&Value::text("Jane Doe")));
        assert_eq!(row.get("first"), None);
        assert_eq!(row.get("last"), None);
        assert_eq!(out.columns(), ["cc_num", "card_holder"]);
    }

    #[test]
    fn single_name_part_is_kept_as_is() {
        let raw = table(&["cc_num", "first"], &[&["1", "Jane"]]);

        let out = dedupe(&raw, "cc_num", &["cc_num", "first", "last"]).expect("dedupe");

        assert_eq!(out.rows()[0].get("first"), Some(&Value::text("Jane")));
        assert_eq!(out.rows()[0].get("card_holder"), None);
    }

    #[test]
    fn key_is_always_retained() {
        let raw = table(&["merchant", "category"], &[&["m1", "food"]]);

        let out = dedupe(&raw, "merchant", &["category"]).expect("dedupe");

        assert!(out.has_column("merchant"));
    }

    #[test]
    fn missing_key_is_an_error() {
        let raw = table(&["merchant"], &[&["m1"]]);
        assert!(matches!(
            dedupe(&raw, "cc_num", &["merchant"]),
            Err(CardGraphError::MissingColumn(_))
        ));
    }

    #[test]
    fn dedupe_is_idempotent_with_name_synthesis() {
        let raw = table(
            &["cc_num", "first", "last", "zip"],
            &[&["1", "Jane", "Doe", "100"], &["1", "John", "Roe", "200"]],
        );
        let keep = ["cc_num", "first", "last", "zip"];

        let once = dedupe(&raw, "cc_num", &keep).expect("once");
        let twice = dedupe(&once, "cc_num", &keep).expect("twice");

        assert_eq!(once, twice);
    }
}
