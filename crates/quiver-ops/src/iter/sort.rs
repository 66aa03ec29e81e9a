//! Full-buffer sort.
//!
//! Filling and draining are distinct phases. The buffer may only be sorted
//! once the input is known to be exhausted; a false pull with the
//! reached-limit flag set is a pause, and sorting a paused buffer would
//! emit rows that still have unseen predecessors. Every buffered row is
//! charged to the memory ceiling.

use std::cmp::Ordering;

use quiver_core::compare::total_cmp;
use quiver_core::error::{Error, Result};
use quiver_core::value::Value;

use crate::context::RuntimeContext;
use crate::node::{NodeMeta, PlanNode, SortSpec};
use crate::state::{ChildStatus, Step};

use super::next;

pub(super) fn next_sort(
    meta: &NodeMeta,
    input: &PlanNode,
    specs: &[SortSpec],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.sort_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.sort_mut(id)?.step = Step::Running,
    }

    if !ctx.sort_mut(id)?.sorted {
        loop {
            if !next(input, ctx)? {
                if ctx.reached_limit() {
                    ctx.sort_mut(id)?.input_status = ChildStatus::Paused;
                    return Ok(false);
                }
                ctx.sort_mut(id)?.input_status = ChildStatus::Exhausted;
                break;
            }
            let item = ctx.reg(input.result_reg()).clone();
            check_sort_keys(&item, specs, meta)?;
            ctx.consume(item.size_bytes(), "sort")?;
            ctx.sort_mut(id)?.rows.push(item);
        }
        let st = ctx.sort_mut(id)?;
        st.rows.sort_by(|a, b| cmp_rows(a, b, specs));
        st.sorted = true;
    }

    let st = ctx.sort_mut(id)?;
    if st.next_idx < st.rows.len() {
        let item = st.rows[st.next_idx].clone();
        st.next_idx += 1;
        ctx.set_reg(meta.result_reg, item);
        Ok(true)
    } else {
        st.step = Step::Done;
        Ok(false)
    }
}

fn check_sort_keys(item: &Value, specs: &[SortSpec], meta: &NodeMeta) -> Result<()> {
    let Value::Record(rec) = item else {
        return Err(Error::query(
            format!("sort input must be a record, got {}", item.type_name()),
            meta.loc,
        ));
    };
    for spec in specs {
        if let Some(v) = rec.get(&spec.field) {
            if v.is_complex() {
                return Err(Error::query(
                    format!(
                        "sort key '{}' has non-atomic type {}",
                        spec.field,
                        v.type_name()
                    ),
                    meta.loc,
                ));
            }
        }
    }
    Ok(())
}

fn cmp_rows(a: &Value, b: &Value, specs: &[SortSpec]) -> Ordering {
    for spec in specs {
        let ka = key_of(a, &spec.field);
        let kb = key_of(b, &spec.field);
        let ord = cmp_keys(ka, kb, spec);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

static MISSING: Value = Value::Empty;

fn key_of<'a>(row: &'a Value, field: &str) -> &'a Value {
    match row {
        Value::Record(rec) => rec.get(field).unwrap_or(&MISSING),
        _ => &MISSING,
    }
}

/// NULL-ish placement is absolute per the key's flag; direction only flips
/// the order of the non-null values.
fn cmp_keys(a: &Value, b: &Value, spec: &SortSpec) -> Ordering {
    let a_null = a.is_any_null() || a.is_empty_marker();
    let b_null = b.is_any_null() || b.is_empty_marker();
    match (a_null, b_null) {
        (true, true) => total_cmp(a, b),
        (true, false) => {
            if spec.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if spec.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = total_cmp(a, b);
            if spec.descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}
