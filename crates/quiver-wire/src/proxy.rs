//! Reduced external plan format.
//!
//! Language drivers execute only a small expression subset on their side of
//! the proxy; everything else stays on the server. This codec is
//! write-only: the server serializes the driver-side fragment, it never
//! reads one back. Any node kind outside the supported subset is a version
//! error, reported before any bytes are produced.

use quiver_core::error::{Error, Result};
use quiver_core::value::Value;
use quiver_ops::node::PlanNode;

use crate::bytes::Writer;
use crate::internal::arith_op_code;

/// Only protocol revision the external format has.
pub const PROXY_VERSION: u16 = 1;

const P_CONST: u8 = 1;
const P_VAR_REF: u8 = 2;
const P_FIELD_STEP: u8 = 3;
const P_ARITH: u8 = 4;
const P_NOT: u8 = 5;
const P_FILTER: u8 = 6;
const P_OFFSET_LIMIT: u8 = 7;

pub fn encode_proxy(node: &PlanNode, driver_version: u16) -> Result<Vec<u8>> {
    if driver_version != PROXY_VERSION {
        return Err(Error::Version(format!(
            "driver negotiated external format {driver_version}, server supports {PROXY_VERSION}"
        )));
    }
    check_supported(node)?;
    let mut w = Writer::new();
    w.u16(PROXY_VERSION);
    write_node(&mut w, node)?;
    Ok(w.into_bytes())
}

fn check_supported(node: &PlanNode) -> Result<()> {
    match node {
        PlanNode::Const { .. }
        | PlanNode::VarRef { .. }
        | PlanNode::FieldStep { .. }
        | PlanNode::Arith { .. }
        | PlanNode::Not { .. }
        | PlanNode::Filter { .. }
        | PlanNode::OffsetLimit { .. } => {}
        other => {
            return Err(Error::Version(format!(
                "operation {} is not supported by the external protocol",
                other.kind_name()
            )))
        }
    }
    for child in node.children() {
        check_supported(child)?;
    }
    Ok(())
}

fn write_node(w: &mut Writer, node: &PlanNode) -> Result<()> {
    match node {
        PlanNode::Const { value, .. } => {
            w.u8(P_CONST);
            write_common(w, node);
            write_atom(w, value)?;
        }
        PlanNode::VarRef { name, source, .. } => {
            w.u8(P_VAR_REF);
            write_common(w, node);
            w.str(name);
            w.varint(u64::from(source.get()));
        }
        PlanNode::FieldStep { input, field, .. } => {
            w.u8(P_FIELD_STEP);
            write_common(w, node);
            w.str(field);
            write_node(w, input)?;
        }
        PlanNode::Arith { ops, operands, .. } => {
            w.u8(P_ARITH);
            write_common(w, node);
            w.varint(ops.len() as u64);
            for op in ops {
                w.u8(arith_op_code(*op));
            }
            for operand in operands {
                write_node(w, operand)?;
            }
        }
        PlanNode::Not { input, .. } => {
            w.u8(P_NOT);
            write_common(w, node);
            write_node(w, input)?;
        }
        PlanNode::Filter {
            input, predicate, ..
        } => {
            w.u8(P_FILTER);
            write_common(w, node);
            write_node(w, input)?;
            write_node(w, predicate)?;
        }
        PlanNode::OffsetLimit {
            input,
            offset,
            limit,
            ..
        } => {
            w.u8(P_OFFSET_LIMIT);
            write_common(w, node);
            write_node(w, input)?;
            write_opt(w, offset.as_deref())?;
            write_opt(w, limit.as_deref())?;
        }
        other => {
            // check_supported runs first; reaching here is a bug.
            return Err(Error::invariant(format!(
                "unsupported {} node survived the external-format check",
                other.kind_name()
            )));
        }
    }
    Ok(())
}

fn write_common(w: &mut Writer, node: &PlanNode) {
    let meta = node.meta();
    w.varint(u64::from(meta.result_reg.get()));
    w.varint(u64::from(meta.loc.line));
    w.varint(u64::from(meta.loc.column));
}

fn write_opt(w: &mut Writer, node: Option<&PlanNode>) -> Result<()> {
    match node {
        Some(n) => {
            w.bool(true);
            write_node(w, n)
        }
        None => {
            w.bool(false);
            Ok(())
        }
    }
}

/// Drivers understand atomic constants only.
fn write_atom(w: &mut Writer, v: &Value) -> Result<()> {
    match v {
        Value::Null => w.u8(0),
        Value::JsonNull => w.u8(1),
        Value::Empty => w.u8(2),
        Value::Bool(b) => {
            w.u8(3);
            w.bool(*b);
        }
        Value::Int(i) => {
            w.u8(4);
            w.zigzag(i64::from(*i));
        }
        Value::Long(l) => {
            w.u8(5);
            w.zigzag(*l);
        }
        Value::Float(f) => {
            w.u8(6);
            w.f32_bits(*f);
        }
        Value::Double(d) => {
            w.u8(7);
            w.f64_bits(*d);
        }
        Value::Decimal(d) => {
            w.u8(8);
            w.str(&d.to_string());
        }
        Value::Str(s) => {
            w.u8(9);
            w.str(s);
        }
        Value::Timestamp(ts) => {
            w.u8(10);
            w.str(&ts.to_rfc3339());
        }
        other => {
            return Err(Error::Version(format!(
                "{} constants are not supported by the external protocol",
                other.type_name()
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::loc::Location;
    use quiver_core::numeric::ArithOp;
    use quiver_ops::build::PlanBuilder;

    const LOC: Location = Location::new(1, 1);

    #[test]
    fn supported_fragment_encodes() {
        let mut b = PlanBuilder::new();
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let sum = b
            .arith(vec![ArithOp::Add, ArithOp::Add], vec![c1, c2], LOC)
            .unwrap();
        let off = b.constant(0i32, LOC);
        let window = b.offset_limit(sum, Some(off), None, LOC);
        let bytes = encode_proxy(&window, PROXY_VERSION).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn unsupported_operation_is_a_version_error() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let sorted = b.sort(src, vec![], LOC);
        let err = encode_proxy(&sorted, PROXY_VERSION).unwrap_err();
        assert!(matches!(err, Error::Version(_)));
    }

    #[test]
    fn nested_unsupported_operation_is_caught_before_writing() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let sorted = b.sort(src, vec![], LOC);
        let off = b.constant(0i32, LOC);
        let window = b.offset_limit(sorted, Some(off), None, LOC);
        assert!(matches!(
            encode_proxy(&window, PROXY_VERSION).unwrap_err(),
            Error::Version(_)
        ));
    }

    #[test]
    fn wrong_driver_version_is_rejected() {
        let mut b = PlanBuilder::new();
        let c = b.constant(1i32, LOC);
        assert!(matches!(
            encode_proxy(&c, 9).unwrap_err(),
            Error::Version(_)
        ));
    }
}
