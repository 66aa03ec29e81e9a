//! Leaf and pass-through operators: constants, variable references, field
//! steps, boolean NOT, numeric negate, filter and offset/limit.

use quiver_core::error::{Error, Result};
use quiver_core::numeric::negate;
use quiver_core::value::Value;
use quiver_core::RegId;

use crate::context::RuntimeContext;
use crate::node::{NodeMeta, PlanNode};
use crate::state::Step;

use super::{eval_single, next};

pub(super) fn next_const(
    meta: &NodeMeta,
    value: &Value,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;
    ctx.set_reg(meta.result_reg, value.clone());
    Ok(true)
}

pub(super) fn next_seq_const(
    meta: &NodeMeta,
    items: &[Value],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.seq_const_mut(meta.state_id)?;
    if st.step == Step::Done {
        return Ok(false);
    }
    st.step = Step::Running;
    if st.idx >= items.len() {
        st.step = Step::Done;
        return Ok(false);
    }
    let item = items[st.idx].clone();
    st.idx += 1;
    ctx.set_reg(meta.result_reg, item);
    Ok(true)
}

/// Republish another node's register. An `Empty` slot means the variable is
/// unbound: produce nothing.
pub(super) fn next_var_ref(
    meta: &NodeMeta,
    source: RegId,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;
    let v = ctx.reg(source).clone();
    if v.is_empty_marker() {
        return Ok(false);
    }
    ctx.set_reg(meta.result_reg, v);
    Ok(true)
}

/// Step into a record field. Items that are not records, and records missing
/// the field, are skipped rather than erroring.
pub(super) fn next_field_step(
    meta: &NodeMeta,
    input: &PlanNode,
    field: &str,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step == Step::Done {
        return Ok(false);
    }
    st.step = Step::Running;
    loop {
        if !next(input, ctx)? {
            if !ctx.reached_limit() {
                ctx.simple_mut(meta.state_id)?.step = Step::Done;
            }
            return Ok(false);
        }
        if let Value::Record(rec) = ctx.reg(input.result_reg()) {
            if let Some(v) = rec.get(field) {
                let v = v.clone();
                ctx.set_reg(meta.result_reg, v);
                return Ok(true);
            }
        }
    }
}

pub(super) fn next_negate(
    meta: &NodeMeta,
    input: &PlanNode,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;
    let v = eval_single(input, ctx)?;
    let out = match v {
        Value::Empty => return Ok(false),
        Value::Null | Value::JsonNull => Value::Null,
        other => negate(&other, meta.loc)?,
    };
    ctx.set_reg(meta.result_reg, out);
    Ok(true)
}

/// Three-valued NOT. An operand that produces nothing counts as FALSE, so
/// the negation is TRUE.
pub(super) fn next_not(
    meta: &NodeMeta,
    input: &PlanNode,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;
    let out = match eval_single(input, ctx)? {
        Value::Empty => Value::Bool(true),
        Value::Null | Value::JsonNull => Value::Null,
        Value::Bool(b) => Value::Bool(!b),
        other => {
            return Err(Error::query(
                format!("NOT operand must be boolean, got {}", other.type_name()),
                meta.loc,
            ))
        }
    };
    ctx.set_reg(meta.result_reg, out);
    Ok(true)
}

pub(super) fn next_filter(
    meta: &NodeMeta,
    input: &PlanNode,
    predicate: &PlanNode,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step == Step::Done {
        return Ok(false);
    }
    st.step = Step::Running;
    loop {
        if !next(input, ctx)? {
            if !ctx.reached_limit() {
                ctx.simple_mut(meta.state_id)?.step = Step::Done;
            }
            return Ok(false);
        }
        match eval_single(predicate, ctx)? {
            Value::Bool(true) => {
                let item = ctx.reg(input.result_reg()).clone();
                ctx.set_reg(meta.result_reg, item);
                return Ok(true);
            }
            // Unknown and "nothing" both fail to select the item.
            Value::Bool(false) | Value::Null | Value::JsonNull | Value::Empty => {}
            other => {
                return Err(Error::query(
                    format!(
                        "filter predicate must be boolean, got {}",
                        other.type_name()
                    ),
                    predicate.loc(),
                ))
            }
        }
    }
}

pub(super) fn next_offset_limit(
    meta: &NodeMeta,
    input: &PlanNode,
    offset: Option<&PlanNode>,
    limit: Option<&PlanNode>,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.offset_limit_mut(id)?.step {
        Step::Done => return Ok(false),
        Step::Fresh => {
            // Bounds are fixed on the first pull of the execution.
            let off = match offset {
                Some(e) => bound_value(e, "offset", ctx)?,
                None => 0,
            };
            let lim = match limit {
                Some(e) => Some(bound_value(e, "limit", ctx)?),
                None => None,
            };
            let st = ctx.offset_limit_mut(id)?;
            st.offset = off;
            st.limit = lim;
            st.step = Step::Running;
        }
        Step::Running => {}
    }
    let (off, lim) = {
        let st = ctx.offset_limit_mut(id)?;
        (st.offset, st.limit)
    };
    while ctx.offset_limit_mut(id)?.skipped < off {
        if !next(input, ctx)? {
            if !ctx.reached_limit() {
                ctx.offset_limit_mut(id)?.step = Step::Done;
            }
            return Ok(false);
        }
        ctx.offset_limit_mut(id)?.skipped += 1;
    }
    if let Some(lim) = lim {
        if ctx.offset_limit_mut(id)?.emitted >= lim {
            ctx.offset_limit_mut(id)?.step = Step::Done;
            return Ok(false);
        }
    }
    if !next(input, ctx)? {
        if !ctx.reached_limit() {
            ctx.offset_limit_mut(id)?.step = Step::Done;
        }
        return Ok(false);
    }
    let item = ctx.reg(input.result_reg()).clone();
    ctx.set_reg(meta.result_reg, item);
    ctx.offset_limit_mut(id)?.emitted += 1;
    Ok(true)
}

fn bound_value(expr: &PlanNode, what: &str, ctx: &mut RuntimeContext) -> Result<u64> {
    let v = eval_single(expr, ctx)?;
    match v.as_long() {
        Some(n) if n >= 0 => Ok(n as u64),
        _ => Err(Error::query(
            format!("{what} must be a non-negative integer, got {}", v.type_name()),
            expr.loc(),
        )),
    }
}
