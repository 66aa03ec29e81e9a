//! Data mutation tests.
//!
//! Delete and update address rows by key value through the worker layer,
//! and index-size reports live entry counts.

mod test_support;

use quiver::core::value::{Record, Value};
use quiver::ops::PlanNode;
use quiver::{CompiledPlan, ExecOptions, MemTableStore, PlanBuilder};
use test_support::*;

/// Scan `users` keeping only the row whose id equals `id`.
fn match_id(b: &mut PlanBuilder, id: i64) -> PlanNode {
    let scan = b.table_scan("users", LOC);
    let scan_reg = scan.result_reg();
    let row = b.var_ref("user", scan_reg, LOC);
    let row_id = b.field_step(row, "id", LOC);
    let wanted = b.constant(id, LOC);
    let pred = b
        .in_list(vec![row_id], vec![vec![wanted]], LOC)
        .expect("predicate");
    b.filter(scan, pred, LOC)
}

#[test]
fn test_delete_removes_the_matched_row() {
    let store = MemTableStore::new();
    seed_users(&store, 5);

    let mut b = PlanBuilder::new();
    let matched = match_id(&mut b, 3);
    let deleted = b.delete("users", matched, LOC);
    let plan = b.finish(deleted);

    let rows = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("delete run");
    assert_eq!(rows, vec![Value::Bool(true)]);
    assert_eq!(store.row_count("users").expect("count"), 4);

    // Nothing matches any more, so a re-run deletes nothing.
    let mut b = PlanBuilder::new();
    let matched = match_id(&mut b, 3);
    let deleted = b.delete("users", matched, LOC);
    let plan = b.finish(deleted);
    let rows = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("second delete run");
    assert!(rows.is_empty());
    assert_eq!(store.row_count("users").expect("count"), 4);
}

#[test]
fn test_update_sets_the_field_and_reports_the_row() {
    let store = MemTableStore::new();
    seed_users(&store, 5);

    let mut b = PlanBuilder::new();
    let matched = match_id(&mut b, 2);
    let new_age = b.constant(99i64, LOC);
    let updated = b.update("users", "age", new_age, matched, LOC);
    let plan = b.finish(updated);

    let rows = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("update run");
    assert_eq!(rows.len(), 1);
    assert_eq!(long_of(&rows[0], "id"), 2);
    assert_eq!(long_of(&rows[0], "age"), 99);

    // The store reflects the change on a fresh read.
    let mut b = PlanBuilder::new();
    let matched = match_id(&mut b, 2);
    let plan = b.finish(matched);
    let rows = engine(&store, 1000)
        .run_to_completion(&plan, ExecOptions::default())
        .expect("read back");
    assert_eq!(rows.len(), 1);
    assert_eq!(long_of(&rows[0], "age"), 99);
}

fn index_size_plan(index: &str) -> CompiledPlan {
    let mut b = PlanBuilder::new();
    let size = b.index_size("users", index, LOC);
    b.finish(size)
}

#[test]
fn test_index_size_counts_live_entries() {
    let store = MemTableStore::new();
    store.create_table("users", "id");
    store.insert("users", user(1, "ada", 30)).expect("seed");
    store.insert("users", user(2, "bea", 40)).expect("seed");
    store
        .insert(
            "users",
            Value::Record(
                Record::new()
                    .with("id", Value::Long(3))
                    .with("name", Value::Null)
                    .with("age", Value::Long(50)),
            ),
        )
        .expect("seed");

    let eng = engine(&store, 1000);
    let rows = eng
        .run_to_completion(&index_size_plan("name"), ExecOptions::default())
        .expect("index size");
    assert_eq!(rows, vec![Value::Long(2)]);

    // Deleting an indexed row shrinks the count.
    let mut b = PlanBuilder::new();
    let matched = match_id(&mut b, 2);
    let deleted = b.delete("users", matched, LOC);
    let plan = b.finish(deleted);
    eng.run_to_completion(&plan, ExecOptions::default())
        .expect("delete");

    let rows = eng
        .run_to_completion(&index_size_plan("name"), ExecOptions::default())
        .expect("index size after delete");
    assert_eq!(rows, vec![Value::Long(1)]);
}
