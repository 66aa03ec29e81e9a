//! Composite-key membership with three-valued semantics.
//!
//! The result is TRUE when any candidate matches the key on every
//! component, NULL when no candidate matches but at least one comparison
//! was unknown, FALSE otherwise. A NULL-ish key component makes the whole
//! test NULL without evaluating any candidate.

use quiver_core::compare::compare_kv;
use quiver_core::error::Result;
use quiver_core::value::Value;

use crate::context::RuntimeContext;
use crate::node::{NodeMeta, PlanNode};
use crate::state::Step;

use super::eval_single;

pub(super) fn next_in(
    meta: &NodeMeta,
    key: &[PlanNode],
    candidates: &[Vec<PlanNode>],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;

    let mut key_values = Vec::with_capacity(key.len());
    for component in key {
        key_values.push(eval_single(component, ctx)?);
    }
    if key_values
        .iter()
        .any(|v| v.is_any_null() || v.is_empty_marker())
    {
        ctx.set_reg(meta.result_reg, Value::Null);
        return Ok(true);
    }

    let mut any_unknown = false;
    for candidate in candidates {
        // False dominates unknown within one candidate: a definite
        // mismatch on any component rules the candidate out.
        let mut matched = true;
        let mut unknown = false;
        for (kv, component) in key_values.iter().zip(candidate.iter()) {
            let cv = eval_single(component, ctx)?;
            match compare_kv(kv, &cv, component.loc())? {
                Some(std::cmp::Ordering::Equal) => {}
                Some(_) => {
                    matched = false;
                    unknown = false;
                    break;
                }
                None => {
                    matched = false;
                    unknown = true;
                }
            }
        }
        if matched {
            ctx.set_reg(meta.result_reg, Value::Bool(true));
            return Ok(true);
        }
        if unknown {
            any_unknown = true;
        }
    }

    let out = if any_unknown {
        Value::Null
    } else {
        Value::Bool(false)
    };
    ctx.set_reg(meta.result_reg, out);
    Ok(true)
}
