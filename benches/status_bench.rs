//! Benchmarks for status evaluation and snapshot projection
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Map, Value};
use water_monitor::feeds::{alerts_in_collection_order, ReadingHistory};
use water_monitor::model::{DeviceStatus, HistoryRecord, Reading};
use water_monitor::status::{evaluate, Thresholds};
use water_monitor::store::{tree, QuerySpec, Snapshot, StorePath};

fn alerts_value(count: usize) -> Value {
    let mut map = Map::new();
    for i in 0..count {
        map.insert(
            format!("-N{:05}", i),
            json!({
                "message": format!("Alert {}", i),
                "timestamp": 1_700_000_000_000i64 + (i as i64 * 7919) % 100_000,
                "tds": 600.0 + i as f64,
            }),
        );
    }
    Value::Object(map)
}

fn bench_evaluate(c: &mut Criterion) {
    let thresholds = Thresholds::default();
    let reading = Reading {
        tds: 620.0,
        flow_rate: 3.1,
        expected_flow: 5.0,
        total_volume: 120.5,
        timestamp: 1_700_000_000,
        status: DeviceStatus::Normal,
        drop_leakage: true,
    };

    c.bench_function("evaluate", |b| {
        b.iter(|| evaluate(black_box(&reading), black_box(&thresholds)))
    });
}

fn bench_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordering");

    for size in [10, 100, 1000] {
        let value = alerts_value(size);
        let query = QuerySpec::all().order_by_child("timestamp");
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("ordered_children_{}", size), |b| {
            b.iter(|| tree::ordered_children(black_box(&value), black_box(&query)).len())
        });

        let snapshot = Snapshot::new(
            StorePath::new("alerts"),
            query.clone().limit_to_last(10),
            Some(tree::apply_query(value.clone(), &query.clone().limit_to_last(10))),
        );
        group.bench_function(format!("alerts_projection_{}", size), |b| {
            b.iter(|| alerts_in_collection_order(black_box(&snapshot)))
        });
    }

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let records: Vec<HistoryRecord> = (0..20)
        .map(|i| HistoryRecord {
            timestamp: 1_700_000_000 + i * 60,
            tds: 500.0 + (i as f64 * 3.0),
            flow_rate: 4.0 + (i % 3) as f64 * 0.5,
        })
        .collect();

    c.bench_function("history_series_20", |b| {
        b.iter(|| {
            let history = ReadingHistory::from_records(black_box(&records));
            (history.tds.trend(), history.flow.bounds())
        })
    });
}

criterion_group!(benches, bench_evaluate, bench_ordering, bench_history);
criterion_main!(benches);
