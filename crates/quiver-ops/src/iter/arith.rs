//! N-ary arithmetic with the numeric promotion scan.
//!
//! Evaluation is two-phase: first all operands are evaluated and the result
//! kind is fixed (least upper bound of the operand kinds, seeded at Double
//! when a real-division marker is present), then every position is applied
//! left to right at that fixed kind. The running value starts at the family
//! identity, so a leading subtraction negates and a leading division
//! inverts.

use quiver_core::error::{Error, Result};
use quiver_core::numeric::{apply, widen, ArithOp, NumericKind};
use quiver_core::value::Value;

use crate::context::RuntimeContext;
use crate::node::{NodeMeta, PlanNode};
use crate::state::Step;

use super::eval_single;

pub(super) fn next_arith(
    meta: &NodeMeta,
    ops: &[ArithOp],
    operands: &[PlanNode],
    ctx: &mut RuntimeContext,
) -> Result<bool> {
    let st = ctx.simple_mut(meta.state_id)?;
    if st.step != Step::Fresh {
        return Ok(false);
    }
    st.step = Step::Done;

    if ops.len() != operands.len() || ops.is_empty() {
        return Err(Error::invariant(format!(
            "arithmetic arity mismatch: {} operators, {} operands",
            ops.len(),
            operands.len()
        )));
    }

    let mut values = Vec::with_capacity(operands.len());
    for operand in operands {
        values.push(eval_single(operand, ctx)?);
    }

    // NULL (and "nothing") poisons the whole expression.
    if values
        .iter()
        .any(|v| v.is_any_null() || v.is_empty_marker())
    {
        ctx.set_reg(meta.result_reg, Value::Null);
        return Ok(true);
    }

    let mut kind = if ops.contains(&ArithOp::Div) {
        NumericKind::Double
    } else {
        NumericKind::Int
    };
    for (value, operand) in values.iter().zip(operands.iter()) {
        let own = value.numeric_kind().ok_or_else(|| {
            Error::query(
                format!("arithmetic operand is {}, not numeric", value.type_name()),
                operand.loc(),
            )
        })?;
        kind = kind.lub(own);
    }

    let additive = matches!(ops[0], ArithOp::Add | ArithOp::Sub);
    let identity = if additive { Value::Int(0) } else { Value::Int(1) };
    let mut acc = widen(&identity, kind, meta.loc)?;
    for (op, value) in ops.iter().zip(values.iter()) {
        let rhs = widen(value, kind, meta.loc)?;
        acc = apply(*op, &acc, &rhs, kind, meta.loc)?;
    }

    ctx.set_reg(meta.result_reg, acc);
    Ok(true)
}
