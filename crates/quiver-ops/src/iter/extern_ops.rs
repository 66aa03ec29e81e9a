//! Storage-delegating operators.
//!
//! The node owns the protocol plumbing; the worker owns the storage access.
//! Workers live in the state slot and are moved out for the duration of a
//! call so the context can be borrowed mutably by both sides.

use quiver_core::error::Result;

use crate::context::RuntimeContext;
use crate::node::{NodeMeta, PlanNode};
use crate::state::Step;

use super::{eval_single, next};

/// Source-shaped delegates: table scan and index size. All rows come from
/// the worker.
pub(super) fn next_source(meta: &NodeMeta, ctx: &mut RuntimeContext) -> Result<bool> {
    let id = meta.state_id;
    match ctx.external_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.external_mut(id)?.step = Step::Running,
    }
    let mut worker = ctx.take_worker(id)?;
    let produced = worker.next(ctx);
    ctx.put_worker(id, worker)?;
    let produced = produced?;
    if !produced && !ctx.reached_limit() {
        ctx.external_mut(id)?.step = Step::Done;
    }
    Ok(produced)
}

/// Row-driven delegates: delete and update. Each input row is handed to the
/// worker through the argument registers; update also evaluates its
/// replacement-value expression per row.
pub(super) fn next_per_row(
    meta: &NodeMeta,
    input: &PlanNode,
    value: Option<&PlanNode>,
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.external_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.external_mut(id)?.step = Step::Running,
    }
    if !next(input, ctx)? {
        if !ctx.reached_limit() {
            ctx.external_mut(id)?.step = Step::Done;
        }
        return Ok(false);
    }
    if let Some(expr) = value {
        // Leaves the replacement value in the expression's register for the
        // worker to read.
        eval_single(expr, ctx)?;
    }
    let mut worker = ctx.take_worker(id)?;
    let produced = worker.next(ctx);
    ctx.put_worker(id, worker)?;
    Ok(produced?)
}
