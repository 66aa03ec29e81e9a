//! In-memory storage backend.
//!
//! Tables are ordered vectors of records with a declared key field. The
//! scan worker enforces the per-batch row quota and carries the
//! continuation position across suspensions; delete and update address
//! rows by key value so they stay correct even when positions shift.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use quiver_core::compare::equal;
use quiver_core::error::{Error, Result};
use quiver_core::loc::Location;
use quiver_core::value::Value;
use quiver_core::{RegId, StateId};
use quiver_ops::context::RuntimeContext;
use quiver_ops::external::{WorkerFactory, WorkerIter, WorkerKind, WorkerRequest};
use quiver_ops::resume::{ResumeEntry, ResumeInfo};

struct Table {
    key_field: String,
    rows: Vec<Value>,
}

#[derive(Default)]
struct StoreInner {
    tables: HashMap<String, Table>,
}

/// Shared in-memory table store; cheap to clone.
#[derive(Clone, Default)]
pub struct MemTableStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_table(&self, name: impl Into<String>, key_field: impl Into<String>) {
        self.lock().tables.insert(
            name.into(),
            Table {
                key_field: key_field.into(),
                rows: Vec::new(),
            },
        );
    }

    /// Append one record row. The row must carry the table's key field.
    pub fn insert(&self, table: &str, row: Value) -> Result<()> {
        let mut inner = self.lock();
        let t = table_mut(&mut inner, table)?;
        let Value::Record(rec) = &row else {
            return Err(Error::invariant(format!(
                "row inserted into '{table}' is {}, not a record",
                row.type_name()
            )));
        };
        if rec.get(&t.key_field).is_none() {
            return Err(Error::invariant(format!(
                "row inserted into '{table}' lacks key field '{}'",
                t.key_field
            )));
        }
        t.rows.push(row);
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        let mut inner = self.lock();
        Ok(table_mut(&mut inner, table)?.rows.len())
    }

    fn row_at(&self, table: &str, idx: usize) -> Result<Option<Value>> {
        let mut inner = self.lock();
        Ok(table_mut(&mut inner, table)?.rows.get(idx).cloned())
    }

    fn key_of(&self, table: &str, row: &Value) -> Result<Value> {
        let mut inner = self.lock();
        let t = table_mut(&mut inner, table)?;
        match row {
            Value::Record(rec) => Ok(rec.get(&t.key_field).cloned().unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    fn delete_by_key(&self, table: &str, key: &Value) -> Result<bool> {
        let mut inner = self.lock();
        let t = table_mut(&mut inner, table)?;
        let pos = t.rows.iter().position(|row| row_has_key(row, &t.key_field, key));
        match pos {
            Some(i) => {
                t.rows.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_by_key(
        &self,
        table: &str,
        key: &Value,
        field: &str,
        value: Value,
    ) -> Result<Option<Value>> {
        let mut inner = self.lock();
        let t = table_mut(&mut inner, table)?;
        for row in &mut t.rows {
            if row_has_key(row, &t.key_field, key) {
                if let Value::Record(rec) = row {
                    rec.set(field, value);
                    return Ok(Some(row.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Entry count of a secondary index, modeled as the number of rows with
    /// a non-NULL value in the indexed field.
    fn index_size(&self, table: &str, index_field: &str) -> Result<u64> {
        let mut inner = self.lock();
        let t = table_mut(&mut inner, table)?;
        let n = t
            .rows
            .iter()
            .filter(|row| match row {
                Value::Record(rec) => rec
                    .get(index_field)
                    .map(|v| !v.is_any_null())
                    .unwrap_or(false),
                _ => false,
            })
            .count();
        Ok(n as u64)
    }
}

fn table_mut<'a>(inner: &'a mut StoreInner, name: &str) -> Result<&'a mut Table> {
    inner
        .tables
        .get_mut(name)
        .ok_or_else(|| Error::query(format!("table '{name}' does not exist"), Location::default()))
}

fn row_has_key(row: &Value, key_field: &str, key: &Value) -> bool {
    match row {
        Value::Record(rec) => rec.get(key_field).is_some_and(|v| equal(v, key)),
        _ => false,
    }
}

/// Worker factory over a [`MemTableStore`].
pub struct MemTableFactory {
    store: MemTableStore,
}

impl MemTableFactory {
    pub fn new(store: MemTableStore) -> Self {
        Self { store }
    }
}

impl WorkerFactory for MemTableFactory {
    fn make(&self, req: &WorkerRequest) -> Result<Box<dyn WorkerIter>> {
        let store = self.store.clone();
        Ok(match req.kind {
            WorkerKind::TableScan => Box::new(ScanWorker {
                store,
                table: req.table.clone(),
                result_reg: req.result_reg,
                state_id: req.state_id,
                next_idx: 0,
                last_emitted: None,
                served: 0,
            }),
            WorkerKind::Delete => Box::new(DeleteWorker {
                store,
                table: req.table.clone(),
                row_reg: arg_reg(req, 0)?,
                result_reg: req.result_reg,
            }),
            WorkerKind::Update => Box::new(UpdateWorker {
                store,
                table: req.table.clone(),
                field: req.field.clone().ok_or_else(|| {
                    Error::invariant("update request without a target field")
                })?,
                row_reg: arg_reg(req, 0)?,
                value_reg: arg_reg(req, 1)?,
                result_reg: req.result_reg,
            }),
            WorkerKind::IndexSize => Box::new(IndexSizeWorker {
                store,
                table: req.table.clone(),
                index: req.index.clone().ok_or_else(|| {
                    Error::invariant("index-size request without an index name")
                })?,
                result_reg: req.result_reg,
                emitted: false,
            }),
        })
    }
}

fn arg_reg(req: &WorkerRequest, i: usize) -> Result<RegId> {
    req.arg_regs.get(i).copied().ok_or_else(|| {
        Error::invariant(format!(
            "{:?} request carries {} argument registers, needs {}",
            req.kind,
            req.arg_regs.len(),
            i + 1
        ))
    })
}

struct ScanWorker {
    store: MemTableStore,
    table: String,
    result_reg: RegId,
    state_id: StateId,
    next_idx: usize,
    /// Position of the last row produced; the continuation key.
    last_emitted: Option<usize>,
    /// Rows produced in this execution, across rewinds; the batch quota.
    served: usize,
}

impl WorkerIter for ScanWorker {
    fn kind_name(&self) -> &'static str {
        "mem-table-scan"
    }

    fn open(&mut self, ctx: &mut RuntimeContext) -> Result<()> {
        if let Some(ResumeEntry::Scan { last, on_current }) =
            ctx.take_resume_entry(self.state_id)
        {
            let last = match last.as_ref().and_then(Value::as_long) {
                Some(idx) if idx >= 0 => idx as usize,
                _ => {
                    return Err(Error::invariant(
                        "scan continuation is not a non-negative row position",
                    ))
                }
            };
            self.next_idx = if on_current { last } else { last + 1 };
        }
        Ok(())
    }

    fn next(&mut self, ctx: &mut RuntimeContext) -> Result<bool> {
        if self.served >= ctx.batch_size() {
            ctx.set_reached_limit(true);
            return Ok(false);
        }
        match self.store.row_at(&self.table, self.next_idx)? {
            Some(row) => {
                ctx.set_reg(self.result_reg, row);
                self.last_emitted = Some(self.next_idx);
                self.next_idx += 1;
                self.served += 1;
                Ok(true)
            }
            None => {
                self.last_emitted = None;
                Ok(false)
            }
        }
    }

    fn reset(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        // Rewind the position; the batch quota deliberately survives, it
        // bounds rows per execution, not per pass.
        self.next_idx = 0;
        self.last_emitted = None;
        Ok(())
    }

    fn close(&mut self, _ctx: &mut RuntimeContext) {}

    fn suspend(&self, info: &mut ResumeInfo) -> Result<()> {
        if let Some(idx) = self.last_emitted {
            info.insert(
                self.state_id,
                ResumeEntry::Scan {
                    last: Some(Value::Long(idx as i64)),
                    on_current: false,
                },
            );
        }
        Ok(())
    }
}

struct DeleteWorker {
    store: MemTableStore,
    table: String,
    row_reg: RegId,
    result_reg: RegId,
}

impl WorkerIter for DeleteWorker {
    fn kind_name(&self) -> &'static str {
        "mem-table-delete"
    }

    fn open(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, ctx: &mut RuntimeContext) -> Result<bool> {
        let row = ctx.reg(self.row_reg).clone();
        let key = self.store.key_of(&self.table, &row)?;
        let deleted = self.store.delete_by_key(&self.table, &key)?;
        ctx.set_reg(self.result_reg, Value::Bool(deleted));
        Ok(true)
    }

    fn reset(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _ctx: &mut RuntimeContext) {}

    fn suspend(&self, _info: &mut ResumeInfo) -> Result<()> {
        Ok(())
    }
}

struct UpdateWorker {
    store: MemTableStore,
    table: String,
    field: String,
    row_reg: RegId,
    value_reg: RegId,
    result_reg: RegId,
}

impl WorkerIter for UpdateWorker {
    fn kind_name(&self) -> &'static str {
        "mem-table-update"
    }

    fn open(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, ctx: &mut RuntimeContext) -> Result<bool> {
        let row = ctx.reg(self.row_reg).clone();
        let value = match ctx.reg(self.value_reg) {
            Value::Empty => Value::Null,
            v => v.clone(),
        };
        let key = self.store.key_of(&self.table, &row)?;
        let updated = self
            .store
            .update_by_key(&self.table, &key, &self.field, value)?;
        ctx.set_reg(self.result_reg, updated.unwrap_or(Value::Null));
        Ok(true)
    }

    fn reset(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _ctx: &mut RuntimeContext) {}

    fn suspend(&self, _info: &mut ResumeInfo) -> Result<()> {
        Ok(())
    }
}

struct IndexSizeWorker {
    store: MemTableStore,
    table: String,
    index: String,
    result_reg: RegId,
    emitted: bool,
}

impl WorkerIter for IndexSizeWorker {
    fn kind_name(&self) -> &'static str {
        "mem-index-size"
    }

    fn open(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, ctx: &mut RuntimeContext) -> Result<bool> {
        if self.emitted {
            return Ok(false);
        }
        let size = self.store.index_size(&self.table, &self.index)?;
        ctx.set_reg(self.result_reg, Value::Long(size as i64));
        self.emitted = true;
        Ok(true)
    }

    fn reset(&mut self, _ctx: &mut RuntimeContext) -> Result<()> {
        self.emitted = false;
        Ok(())
    }

    fn close(&mut self, _ctx: &mut RuntimeContext) {}

    fn suspend(&self, _info: &mut ResumeInfo) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::value::Record;

    fn user(id: i64, name: &str) -> Value {
        Value::Record(
            Record::new()
                .with("id", Value::Long(id))
                .with("name", Value::Str(name.into())),
        )
    }

    #[test]
    fn delete_addresses_rows_by_key() {
        let store = MemTableStore::new();
        store.create_table("users", "id");
        store.insert("users", user(1, "ada")).unwrap();
        store.insert("users", user(2, "bea")).unwrap();
        assert!(store.delete_by_key("users", &Value::Long(1)).unwrap());
        assert!(!store.delete_by_key("users", &Value::Long(1)).unwrap());
        assert_eq!(store.row_count("users").unwrap(), 1);
    }

    #[test]
    fn index_size_counts_non_null_entries() {
        let store = MemTableStore::new();
        store.create_table("users", "id");
        store.insert("users", user(1, "ada")).unwrap();
        store
            .insert(
                "users",
                Value::Record(
                    Record::new()
                        .with("id", Value::Long(2))
                        .with("name", Value::Null),
                ),
            )
            .unwrap();
        assert_eq!(store.index_size("users", "name").unwrap(), 1);
        assert_eq!(store.index_size("users", "id").unwrap(), 2);
    }

    #[test]
    fn missing_table_is_a_query_error() {
        let store = MemTableStore::new();
        assert!(matches!(
            store.row_count("nope").unwrap_err(),
            Error::Query { .. }
        ));
    }
}
