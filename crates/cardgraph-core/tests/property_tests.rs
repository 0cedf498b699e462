//! # Property-Based Tests
//!
//! Invariants of deduplication, batching and concurrent linking, checked
//! with proptest.

use cardgraph_core::{
    GraphStore, MemoryGraph, Record, RecordSet, Unit, Value, WorkerPool, dedupe, link_batch,
    partition,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const REL: &str = "MADE_PURCHASE_AT";

/// Rows of (card, first name, city) with plenty of repeated cards.
fn customer_rows() -> impl Strategy<Value = Vec<(i64, String, String)>> {
    vec((0i64..20, "[A-Z][a-z]{1,6}", "[A-Z][a-z]{2,8}"), 0..80)
}

fn customer_table(rows: &[(i64, String, String)]) -> RecordSet {
    let columns = ["cc_num", "first", "last", "city"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let records = rows
        .iter()
        .map(|(card, first, city)| {
            [
                ("cc_num", Value::Integer(*card)),
                ("first", Value::text(first.clone())),
                ("last", Value::text("Doe")),
                ("city", Value::text(city.clone())),
            ]
            .into_iter()
            .collect::<Record>()
        })
        .collect();
    RecordSet::from_rows(columns, records)
}

fn purchase_table(events: &[(i64, u8)]) -> RecordSet {
    let columns = ["cc_num", "merchant", "trans_num", "amt"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let records = events
        .iter()
        .enumerate()
        .map(|(i, (card, merchant))| {
            [
                ("cc_num", Value::Integer(*card)),
                ("merchant", Value::text(format!("m{merchant}"))),
                ("trans_num", Value::text(format!("t{i}"))),
                ("amt", Value::Integer(i as i64)),
            ]
            .into_iter()
            .collect::<Record>()
        })
        .collect();
    RecordSet::from_rows(columns, records)
}

/// A store holding customers 0..10 and merchants m0..m4.
fn seeded_store() -> MemoryGraph {
    let graph = MemoryGraph::new();
    for card in 0..10 {
        graph
            .merge_node("Customer", "cc_num", &[("cc_num", Value::Integer(card))].into_iter().collect())
            .expect("merge");
    }
    for m in 0..5 {
        graph
            .merge_node(
                "Merchant",
                "merchant",
                &[("merchant", Value::text(format!("m{m}")))].into_iter().collect(),
            )
            .expect("merge");
    }
    graph
}

/// Linked edges as (trans_num, from, to).
fn edge_set(graph: &MemoryGraph) -> BTreeSet<(String, u64, u64)> {
    graph
        .relationships(REL)
        .expect("edges")
        .into_iter()
        .map(|r| {
            let trans = r
                .properties
                .get("trans_num")
                .map(ToString::to_string)
                .unwrap_or_default();
            (trans, r.from.0, r.to.0)
        })
        .collect()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Deduplicating twice equals deduplicating once.
    #[test]
    fn dedupe_is_idempotent(rows in customer_rows()) {
        let table = customer_table(&rows);
        let keep = ["cc_num", "first", "last", "city"];

        let once = dedupe(&table, "cc_num", &keep).expect("once");
        let twice = dedupe(&once, "cc_num", &keep).expect("twice");

        prop_assert_eq!(once, twice);
    }

    /// The first row of each key supplies the attributes.
    #[test]
    fn dedupe_keeps_first_occurrence(rows in customer_rows()) {
        let table = customer_table(&rows);
        let out = dedupe(&table, "cc_num", &["cc_num", "city"]).expect("dedupe");

        let mut first_city: BTreeMap<i64, &str> = BTreeMap::new();
        for (card, _, city) in &rows {
            first_city.entry(*card).or_insert(city.as_str());
        }

        prop_assert_eq!(out.len(), first_city.len());
        for row in out.rows() {
            let card = match row.get("cc_num") {
                Some(Value::Integer(c)) => *c,
                other => return Err(TestCaseError::fail(format!("bad key {other:?}"))),
            };
            prop_assert_eq!(row.get("city"), Some(&Value::text(first_city[&card])));
        }
    }

    /// Batches cover every purchase exactly once.
    #[test]
    fn batches_partition_the_purchases(
        events in vec((0i64..10, 0u8..5), 0..200),
        size in 1usize..40,
    ) {
        let table = purchase_table(&events);
        let batches = partition(&table, size);

        prop_assert_eq!(batches.len(), events.len().div_ceil(size));

        let mut seen = BTreeSet::new();
        for batch in &batches {
            prop_assert!(batch.len() <= size);
            for row in batch.rows {
                let trans = row.get("trans_num").map(ToString::to_string);
                prop_assert!(seen.insert(trans));
            }
        }
        prop_assert_eq!(seen.len(), events.len());
    }

    /// Concurrent batches yield the same edges as sequential ones.
    #[test]
    fn concurrent_linking_matches_sequential(
        events in vec((0i64..12, 0u8..6), 1..120),
        size in 1usize..25,
    ) {
        let table = purchase_table(&events);

        let sequential = seeded_store();
        for batch in partition(&table, size) {
            link_batch(&sequential, &batch, REL);
        }

        let concurrent = seeded_store();
        let batches = partition(&table, size);
        let pool = WorkerPool::new(4).expect("pool");
        let store: &dyn GraphStore = &concurrent;
        let units = batches
            .iter()
            .map(|b| Unit::new(format!("batch-{}", b.index), move || Ok(link_batch(store, b, REL))))
            .collect();
        let outcomes = pool.run_all(units);

        prop_assert!(outcomes.iter().all(|o| o.succeeded()));
        prop_assert_eq!(edge_set(&sequential), edge_set(&concurrent));
    }
}
