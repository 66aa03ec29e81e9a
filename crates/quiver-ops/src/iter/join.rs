//! N-branch nested-loop join.
//!
//! Branch 0 is outermost. Advancing works as descend/back-up over a branch
//! cursor: a row from branch d publishes its correlation variables and
//! descends; an exhausted branch d backs up to d-1; a row from the
//! innermost branch emits one joined tuple (an array of the branch
//! values). Descending normally rewinds the next branch, except on the
//! first descent after a resumed open, where the branch is already
//! positioned at its suspension point.

use quiver_core::error::Result;
use quiver_core::value::Value;

use crate::context::RuntimeContext;
use crate::node::{JoinPred, NodeMeta, PlanNode};
use crate::state::Step;

use super::{next, reset};

pub(super) fn next_join(
    meta: &NodeMeta,
    branches: &[PlanNode],
    preds: &[JoinPred],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let id = meta.state_id;
    match ctx.join_mut(id)?.step {
        Step::Done => return Ok(false),
        _ => ctx.join_mut(id)?.step = Step::Running,
    }
    loop {
        let depth = ctx.join_mut(id)?.depth;
        if next(&branches[depth], ctx)? {
            publish_vars(depth, branches, preds, ctx);
            if depth + 1 == branches.len() {
                let tuple: Vec<Value> = branches
                    .iter()
                    .map(|b| ctx.reg(b.result_reg()).clone())
                    .collect();
                ctx.set_reg(meta.result_reg, Value::Array(tuple));
                return Ok(true);
            }
            let st = ctx.join_mut(id)?;
            st.depth = depth + 1;
            if st.keep_position[depth + 1] {
                st.keep_position[depth + 1] = false;
            } else {
                reset(&branches[depth + 1], ctx)?;
            }
        } else {
            if ctx.reached_limit() {
                return Ok(false);
            }
            if depth == 0 {
                ctx.join_mut(id)?.step = Step::Done;
                return Ok(false);
            }
            ctx.join_mut(id)?.depth = depth - 1;
        }
    }
}

fn publish_vars(
    depth: usize,
    branches: &[PlanNode],
    preds: &[JoinPred],
    ctx: &mut RuntimeContext,
) {
    for pred in preds.iter().filter(|p| p.outer_branch == depth) {
        let v = match ctx.reg(branches[depth].result_reg()) {
            Value::Record(rec) => rec.get(&pred.field).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        ctx.set_reg(pred.var_reg, v);
    }
}
