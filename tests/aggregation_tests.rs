//! Aggregation tests.
//!
//! Covers server-side grouping over clustered input, client-side merging of
//! shard partials, and aggregations suspended mid-stream.

mod test_support;

use quiver::core::config::ExecRole;
use quiver::core::value::{Record, Value};
use quiver::ops::{AggrKind, SortSpec};
use quiver::{CompiledPlan, ExecOptions, MemTableStore, PlanBuilder};
use test_support::*;

fn sale(id: i64, city: &str, amount: i64) -> Value {
    Value::Record(
        Record::new()
            .with("id", Value::Long(id))
            .with("city", Value::Str(city.into()))
            .with("amount", Value::Long(amount)),
    )
}

/// Rows clustered by city, cities in sorted order.
fn seed_sales(store: &MemTableStore, rows: &[(i64, &str, i64)]) {
    store.create_table("sales", "id");
    for (id, city, amount) in rows {
        store.insert("sales", sale(*id, city, *amount)).expect("seed sales");
    }
}

fn group_plan() -> CompiledPlan {
    let mut b = PlanBuilder::new();
    let scan = b.table_scan("sales", LOC);
    let scan_reg = scan.result_reg();

    let row = b.var_ref("sale", scan_reg, LOC);
    let city = b.field_step(row, "city", LOC);
    let row2 = b.var_ref("sale", scan_reg, LOC);
    let amount = b.field_step(row2, "amount", LOC);
    let row3 = b.var_ref("sale", scan_reg, LOC);

    let count = b.aggr_column("n", AggrKind::Count, row3);
    let total = b.aggr_column("total", AggrKind::Sum, amount);
    let grouped = b.group(scan, vec![("city".into(), city)], vec![count, total], LOC);
    b.finish(grouped)
}

#[test]
fn test_group_sums_per_key_run() {
    let store = MemTableStore::new();
    seed_sales(
        &store,
        &[
            (1, "amber", 10),
            (2, "amber", 25),
            (3, "basel", 7),
            (4, "cadiz", 1),
            (5, "cadiz", 2),
            (6, "cadiz", 3),
        ],
    );

    let rows = engine(&store, 1000)
        .run_to_completion(&group_plan(), ExecOptions::default())
        .expect("grouped run");
    assert_eq!(rows.len(), 3);

    let summary: Vec<(String, i64, i64)> = rows
        .iter()
        .map(|r| match r {
            Value::Record(rec) => (
                rec.get("city").and_then(Value::as_str).expect("city").to_string(),
                long_of(r, "n"),
                long_of(r, "total"),
            ),
            other => panic!("expected record, got {other:?}"),
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("amber".into(), 2, 35),
            ("basel".into(), 1, 7),
            ("cadiz".into(), 3, 6),
        ]
    );
}

#[test]
fn test_group_survives_suspension() {
    let store = MemTableStore::new();
    seed_sales(
        &store,
        &[
            (1, "amber", 10),
            (2, "amber", 25),
            (3, "basel", 7),
            (4, "cadiz", 1),
            (5, "cadiz", 2),
            (6, "cadiz", 3),
        ],
    );

    let plan = group_plan();
    let one_shot = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("one-shot run");
    // Batch size 2 suspends the scan inside the amber and cadiz runs.
    let chunked = engine(&store, 2)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("chunked run");
    assert_eq!(chunked, one_shot);
}

#[test]
fn test_client_merge_of_shard_partials_matches_whole_set() {
    let shard_a: &[(i64, &str, i64)] = &[(1, "amber", 10), (2, "basel", 7), (3, "basel", 8)];
    let shard_b: &[(i64, &str, i64)] = &[(4, "amber", 25), (5, "cadiz", 3)];

    // Server pass on each shard produces partial records.
    let mut partials = Vec::new();
    for shard in [shard_a, shard_b] {
        let store = MemTableStore::new();
        seed_sales(&store, shard);
        let rows = engine(&store, 1000)
            .run_to_completion(&group_plan(), ExecOptions::default())
            .expect("shard run");
        partials.extend(rows);
    }

    // Client pass re-clusters the partials and merges them by name.
    let mut b = PlanBuilder::new();
    let seq = b.seq_const(partials, LOC);
    let clustered = b.sort(
        seq,
        vec![SortSpec {
            field: "city".into(),
            descending: false,
            nulls_first: false,
        }],
        LOC,
    );
    let key_placeholder = b.constant(Value::Null, LOC);
    let n_placeholder = b.constant(Value::Null, LOC);
    let total_placeholder = b.constant(Value::Null, LOC);
    let count = b.aggr_column("n", AggrKind::Count, n_placeholder);
    let total = b.aggr_column("total", AggrKind::Sum, total_placeholder);
    let merged = b.group(
        clustered,
        vec![("city".into(), key_placeholder)],
        vec![count, total],
        LOC,
    );
    let client_plan = b.finish(merged);

    let store = MemTableStore::new();
    let eng = engine(&store, 1000);
    let merged_rows = eng
        .run_to_completion(
            &client_plan,
            ExecOptions {
                role: Some(ExecRole::Client),
                ..Default::default()
            },
        )
        .expect("client merge");

    // Whole-set reference run over all rows in one table.
    let whole = MemTableStore::new();
    seed_sales(
        &whole,
        &[
            (1, "amber", 10),
            (4, "amber", 25),
            (2, "basel", 7),
            (3, "basel", 8),
            (5, "cadiz", 3),
        ],
    );
    let whole_rows = engine(&whole, 1000)
        .run_to_completion(&group_plan(), ExecOptions::default())
        .expect("whole-set run");

    assert_eq!(merged_rows, whole_rows);
}

#[test]
fn test_seq_aggr_resumes_mid_stream() {
    let store = MemTableStore::new();
    seed_users(&store, 10);

    let mut b = PlanBuilder::new();
    let scan = b.table_scan("users", LOC);
    let ages = b.field_step(scan, "age", LOC);
    let sum = b.seq_aggr(ages, AggrKind::Sum, LOC);
    let plan = b.finish(sum);

    let expected: i64 = (1..=10).map(|i| 20 + (i % 50)).sum();
    let eng = engine(&store, 3);

    let mut opts = ExecOptions::default();
    let mut rows = Vec::new();
    let mut paused_batches = 0;
    loop {
        let batch = eng.execute_batch(&plan, opts.clone()).expect("batch");
        if !batch.done {
            assert!(batch.results.is_empty());
            paused_batches += 1;
        }
        rows.extend(batch.results);
        if batch.done {
            break;
        }
        opts.resume = batch.resume;
    }
    assert!(paused_batches >= 2);
    assert_eq!(rows, vec![Value::Long(expected)]);
}

#[test]
fn test_collect_distinct_keeps_first_occurrences() {
    let store = MemTableStore::new();
    store.create_table("users", "id");
    for (id, age) in [(1, 30i64), (2, 40), (3, 30), (4, 50), (5, 40)] {
        store.insert("users", user(id, "x", age)).expect("seed");
    }

    let mut b = PlanBuilder::new();
    let scan = b.table_scan("users", LOC);
    let ages = b.field_step(scan, "age", LOC);
    let collected = b.seq_aggr(ages, AggrKind::Collect { distinct: true }, LOC);
    let plan = b.finish(collected);

    let rows = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("collect run");
    assert_eq!(
        rows,
        vec![Value::Array(vec![
            Value::Long(30),
            Value::Long(40),
            Value::Long(50),
        ])]
    );
}
