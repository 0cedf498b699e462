//! # Derivation Benchmarks
//!
//! Performance benchmarks for deduplication, batching and linking.
//!
//! Run with: `cargo bench -p cardgraph-core`

use cardgraph_core::{
    GraphStore, MemoryGraph, Record, RecordSet, Value, customers, link_batch, partition, purchases,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// Synthetic transactions: `size` rows over `size / 10` cards and 50 merchants.
fn transactions(size: usize) -> RecordSet {
    let columns: Vec<String> = [
        "cc_num", "first", "last", "city", "merchant", "category", "amt", "trans_date",
        "trans_time", "trans_num", "unix_time",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    let cards = (size / 10).max(1);
    let rows = (0..size)
        .map(|i| {
            [
                ("cc_num", Value::Integer((i % cards) as i64)),
                ("first", Value::text("Jane")),
                ("last", Value::text("Doe")),
                ("city", Value::text("Oslo")),
                ("merchant", Value::text(format!("fraud_{}", i % 50))),
                ("category", Value::text("food")),
                ("amt", Value::Float(i as f64 * 0.5)),
                ("trans_date", Value::text("21/05/23")),
                ("trans_time", Value::text("10:00:00")),
                ("trans_num", Value::text(format!("t{i}"))),
                ("unix_time", Value::Integer(1_684_663_200 + i as i64)),
            ]
            .into_iter()
            .collect::<Record>()
        })
        .collect();
    RecordSet::from_rows(columns, rows)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_customer_dedupe(c: &mut Criterion) {
    let mut group = c.benchmark_group("customer_dedupe");

    for size in [1_000, 10_000, 50_000].iter() {
        let raw = transactions(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| black_box(customers(raw, None)));
        });
    }

    group.finish();
}

fn bench_purchase_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("purchase_derivation");

    for size in [1_000, 10_000, 50_000].iter() {
        let raw = transactions(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| black_box(purchases(raw)));
        });
    }

    group.finish();
}

fn bench_link_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_batch");

    for size in [1_000, 10_000].iter() {
        let raw = transactions(*size);
        let events = purchases(&raw).expect("purchases");

        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                let graph = MemoryGraph::new();
                for row in raw.rows().iter().take(*size / 10) {
                    let _ = graph.merge_node("Customer", "cc_num", row);
                }
                for m in 0..50 {
                    let merchant: Record =
                        [("merchant", Value::text(format!("fraud_{m}")))].into_iter().collect();
                    let _ = graph.merge_node("Merchant", "merchant", &merchant);
                }
                for batch in partition(events, 10_000) {
                    black_box(link_batch(&graph, &batch, "MADE_PURCHASE_AT"));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_customer_dedupe,
    bench_purchase_derivation,
    bench_link_batch
);
criterion_main!(benches);
