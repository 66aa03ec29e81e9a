//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use quiver::core::config::ExecConfig;
use quiver::core::loc::Location;
use quiver::core::value::{Record, Value};
use quiver::{Engine, MemTableFactory, MemTableStore};

pub const LOC: Location = Location::new(1, 1);

pub fn user(id: i64, name: &str, age: i64) -> Value {
    Value::Record(
        Record::new()
            .with("id", Value::Long(id))
            .with("name", Value::Str(name.into()))
            .with("age", Value::Long(age)),
    )
}

pub fn order(id: i64, user_id: i64, total: i64) -> Value {
    Value::Record(
        Record::new()
            .with("id", Value::Long(id))
            .with("user_id", Value::Long(user_id))
            .with("total", Value::Long(total)),
    )
}

/// `users` table with ids 1..=n, ages cycling through 20..70.
pub fn seed_users(store: &MemTableStore, n: i64) {
    store.create_table("users", "id");
    for i in 1..=n {
        store
            .insert("users", user(i, &format!("user-{i}"), 20 + (i % 50)))
            .expect("seed users");
    }
}

pub fn engine_with(store: &MemTableStore, batch_size: usize, mem_ceiling: u64) -> Engine {
    let cfg = ExecConfig {
        mem_ceiling_bytes: mem_ceiling,
        batch_size,
        trace_level: 0,
    };
    Engine::new(cfg, Arc::new(MemTableFactory::new(store.clone())))
}

pub fn engine(store: &MemTableStore, batch_size: usize) -> Engine {
    engine_with(store, batch_size, 64 * 1024 * 1024)
}

pub fn long_of(v: &Value, field: &str) -> i64 {
    match v {
        Value::Record(rec) => rec
            .get(field)
            .and_then(Value::as_long)
            .unwrap_or_else(|| panic!("field '{field}' missing or not integral in {v:?}")),
        other => panic!("expected a record, got {other:?}"),
    }
}
