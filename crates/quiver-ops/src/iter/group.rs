//! Grouping and whole-sequence aggregation.
//!
//! Group input must arrive clustered by the grouping key (the compiler
//! plans a sort underneath when storage order does not already provide it);
//! grouping is then a streaming pass that emits a finished group whenever
//! the key changes. The boundary uses `extract(reset)` so closing one group
//! and opening the next is one atomic step.
//!
//! Both operators are role-sensitive: the server folds raw rows through
//! each column's input expression, the client reads named partials out of
//! shard result records and merges them.

use quiver_core::compare::equal;
use quiver_core::error::{Error, Result};
use quiver_core::value::{Record, Value};

use crate::aggr::AggrKind;
use crate::context::RuntimeContext;
use crate::node::{AggrColumn, NodeMeta, PlanNode};
use crate::state::Step;

use super::{eval_single, next};

pub(super) fn next_group(
    meta: &NodeMeta,
    input: &PlanNode,
    grouping: &[(String, PlanNode)],
    aggrs: &[AggrColumn],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.group_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.group_mut(id)?.step = Step::Running,
    }
    loop {
        if !next(input, ctx)? {
            if ctx.reached_limit() {
                // Paused upstream; the in-flight group stays open.
                return Ok(false);
            }
            let st = ctx.group_mut(id)?;
            st.step = Step::Done;
            if let Some(key) = st.cur_key.take() {
                let values: Vec<Value> = st.accs.iter_mut().map(|a| a.extract(true)).collect();
                let rec = group_record(grouping, aggrs, &key, values);
                ctx.set_reg(meta.result_reg, rec);
                return Ok(true);
            }
            return Ok(false);
        }

        let (key, inputs) = row_key_and_inputs(meta, input, grouping, aggrs, ctx)?;
        // Collect columns retain their inputs; charge before folding.
        let retained: u64 = aggrs
            .iter()
            .zip(inputs.iter())
            .filter(|(col, _)| matches!(col.kind, AggrKind::Collect { .. }))
            .map(|(_, v)| v.size_bytes())
            .sum();
        if retained > 0 {
            ctx.consume(retained, "group")?;
        }

        let server = ctx.is_server();
        let st = ctx.group_mut(id)?;
        let same_key = st.cur_key.as_ref().map(|cur| keys_equal(cur, &key));
        match same_key {
            Some(true) => {
                fold(&mut st.accs, &inputs, server)?;
            }
            Some(false) => {
                // Key changed: finish the old group, start the new one with
                // this row already folded in, emit the old group.
                let values: Vec<Value> = st.accs.iter_mut().map(|a| a.extract(true)).collect();
                let old_key = st.cur_key.replace(key).unwrap_or_default();
                fold(&mut st.accs, &inputs, server)?;
                let rec = group_record(grouping, aggrs, &old_key, values);
                ctx.set_reg(meta.result_reg, rec);
                return Ok(true);
            }
            None => {
                st.cur_key = Some(key);
                fold(&mut st.accs, &inputs, server)?;
            }
        }
    }
}

fn row_key_and_inputs(
    meta: &NodeMeta,
    input: &PlanNode,
    grouping: &[(String, PlanNode)],
    aggrs: &[AggrColumn],
    ctx: &mut RuntimeContext,
) -> Result<(Vec<Value>, Vec<Value>)> {
    if ctx.is_server() {
        let mut key = Vec::with_capacity(grouping.len());
        for (_, expr) in grouping {
            key.push(eval_single(expr, ctx)?);
        }
        let mut inputs = Vec::with_capacity(aggrs.len());
        for col in aggrs {
            inputs.push(eval_single(&col.input, ctx)?);
        }
        Ok((key, inputs))
    } else {
        let row = ctx.reg(input.result_reg());
        let Value::Record(rec) = row else {
            return Err(Error::query(
                format!("partial group row must be a record, got {}", row.type_name()),
                meta.loc,
            ));
        };
        let key = grouping
            .iter()
            .map(|(name, _)| rec.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        let inputs = aggrs
            .iter()
            .map(|col| rec.get(&col.name).cloned().unwrap_or(Value::Null))
            .collect();
        Ok((key, inputs))
    }
}

fn fold(accs: &mut [crate::aggr::AggrAcc], inputs: &[Value], server: bool) -> Result<()> {
    for (acc, v) in accs.iter_mut().zip(inputs.iter()) {
        if server {
            acc.accumulate(v)?;
        } else {
            acc.merge(v)?;
        }
    }
    Ok(())
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equal(x, y))
}

fn group_record(
    grouping: &[(String, PlanNode)],
    aggrs: &[AggrColumn],
    key: &[Value],
    values: Vec<Value>,
) -> Value {
    let mut rec = Record::new();
    for ((name, _), kv) in grouping.iter().zip(key.iter()) {
        rec.set(name.clone(), kv.clone());
    }
    for (col, v) in aggrs.iter().zip(values) {
        rec.set(col.name.clone(), v);
    }
    Value::Record(rec)
}

pub(super) fn next_seq_aggr(
    meta: &NodeMeta,
    input: &PlanNode,
    kind: AggrKind,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.seq_aggr_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.seq_aggr_mut(id)?.step = Step::Running,
    }
    loop {
        if !next(input, ctx)? {
            break;
        }
        let v = ctx.reg(input.result_reg()).clone();
        if matches!(kind, AggrKind::Collect { .. }) {
            ctx.consume(v.size_bytes(), "collect")?;
        }
        let server = ctx.is_server();
        let st = ctx.seq_aggr_mut(id)?;
        let acc = st
            .acc
            .as_mut()
            .ok_or_else(|| Error::invariant("aggregation accumulator missing"))?;
        if server {
            acc.accumulate(&v)?;
        } else {
            acc.merge(&v)?;
        }
    }
    if ctx.reached_limit() {
        // Paused; keep accumulating after resumption.
        return Ok(false);
    }
    let st = ctx.seq_aggr_mut(id)?;
    st.step = Step::Done;
    let acc = st
        .acc
        .as_mut()
        .ok_or_else(|| Error::invariant("aggregation accumulator missing"))?;
    let out = acc.extract(true);
    ctx.set_reg(meta.result_reg, out);
    Ok(true)
}
