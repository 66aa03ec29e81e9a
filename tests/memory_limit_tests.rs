//! Memory ceiling tests.
//!
//! Buffering operators charge every retained byte against the per-query
//! ceiling and must abort, not thrash, when they cross it.

mod test_support;

use quiver::ops::{AggrKind, SortSpec};
use quiver::{CompiledPlan, Error, ExecOptions, MemTableStore, PlanBuilder};
use test_support::*;

fn sort_plan() -> CompiledPlan {
    let mut b = PlanBuilder::new();
    let scan = b.table_scan("users", LOC);
    let sorted = b.sort(
        scan,
        vec![SortSpec {
            field: "age".into(),
            descending: false,
            nulls_first: false,
        }],
        LOC,
    );
    b.finish(sorted)
}

#[test]
fn test_sort_aborts_at_the_ceiling() {
    let store = MemTableStore::new();
    seed_users(&store, 200);

    let err = engine_with(&store, 1000, 512)
        .run_to_completion(&sort_plan(), ExecOptions::default())
        .expect_err("buffering 200 rows under a 512-byte ceiling");
    assert!(matches!(err, Error::Memory { .. }), "got {err:?}");
    assert!(!err.is_user_error());
}

#[test]
fn test_sort_fits_under_a_generous_ceiling() {
    let store = MemTableStore::new();
    seed_users(&store, 200);

    let rows = engine_with(&store, 1000, 16 * 1024 * 1024)
        .run_to_completion(&sort_plan(), ExecOptions::default())
        .expect("same sort with room to spare");
    assert_eq!(rows.len(), 200);
}

#[test]
fn test_collect_aborts_at_the_ceiling() {
    let store = MemTableStore::new();
    seed_users(&store, 500);

    let mut b = PlanBuilder::new();
    let scan = b.table_scan("users", LOC);
    let names = b.field_step(scan, "name", LOC);
    let collected = b.seq_aggr(names, AggrKind::Collect { distinct: false }, LOC);
    let plan = b.finish(collected);

    let err = engine_with(&store, 1000, 256)
        .run_to_completion(&plan, ExecOptions::default())
        .expect_err("collecting 500 names under a 256-byte ceiling");
    assert!(matches!(err, Error::Memory { .. }), "got {err:?}");
}

#[test]
fn test_non_buffering_plans_ignore_the_ceiling() {
    let store = MemTableStore::new();
    seed_users(&store, 500);

    let mut b = PlanBuilder::new();
    let scan = b.table_scan("users", LOC);
    let plan = b.finish(scan);

    // A plain scan retains nothing, so a tiny ceiling never trips.
    let rows = engine_with(&store, 1000, 64)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("streaming scan under a tiny ceiling");
    assert_eq!(rows.len(), 500);
}
