use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use quiver::core::config::ExecConfig;
use quiver::core::loc::Location;
use quiver::core::value::{Record, Value};
use quiver::ops::{AggrKind, SortSpec};
use quiver::{CompiledPlan, Engine, ExecOptions, MemTableFactory, MemTableStore, PlanBuilder};

const LOC: Location = Location::new(1, 1);

fn seeded_store(rows: usize) -> MemTableStore {
    let store = MemTableStore::new();
    store.create_table("events", "id");
    for i in 0..rows {
        let row = Value::Record(
            Record::new()
                .with("id", Value::Long(i as i64))
                .with("bucket", Value::Str(format!("bucket-{}", i % 4)))
                .with("score", Value::Long((i % 97) as i64)),
        );
        store.insert("events", row).unwrap();
    }
    store
}

fn engine_over(store: &MemTableStore) -> Engine {
    let cfg = ExecConfig {
        batch_size: 1 << 20,
        ..Default::default()
    };
    Engine::new(cfg, Arc::new(MemTableFactory::new(store.clone())))
}

fn sort_plan() -> CompiledPlan {
    let mut b = PlanBuilder::new();
    let scan = b.table_scan("events", LOC);
    let sorted = b.sort(
        scan,
        vec![
            SortSpec {
                field: "score".into(),
                descending: true,
                nulls_first: false,
            },
            SortSpec {
                field: "id".into(),
                descending: false,
                nulls_first: false,
            },
        ],
        LOC,
    );
    b.finish(sorted)
}

fn sum_plan() -> CompiledPlan {
    let mut b = PlanBuilder::new();
    let scan = b.table_scan("events", LOC);
    let scores = b.field_step(scan, "score", LOC);
    let sum = b.seq_aggr(scores, AggrKind::Sum, LOC);
    b.finish(sum)
}

fn bench_sort(c: &mut Criterion) {
    let store = seeded_store(1024);
    let engine = engine_over(&store);
    let plan = sort_plan();
    c.bench_function("sort_1k_rows", |b| {
        b.iter(|| {
            engine
                .run_to_completion(&plan, ExecOptions::default())
                .unwrap()
        })
    });
}

fn bench_seq_aggr(c: &mut Criterion) {
    let store = seeded_store(1024);
    let engine = engine_over(&store);
    let plan = sum_plan();
    c.bench_function("sum_1k_rows", |b| {
        b.iter(|| {
            engine
                .run_to_completion(&plan, ExecOptions::default())
                .unwrap()
        })
    });
}

criterion_group!(runtime, bench_sort, bench_seq_aggr);
criterion_main!(runtime);
