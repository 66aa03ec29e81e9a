//! Internal versioned plan format.
//!
//! Layout: a fixed header (magic, format version), the context dimensions,
//! then the node tree pre-order. Every node starts with a one-byte kind
//! discriminant followed by its common fields (result register, state slot,
//! source location) and kind-specific fields.
//!
//! Version negotiation is write-side: a plan using a feature the negotiated
//! version cannot carry is rejected before a single byte is produced, never
//! half-written. The reader enforces the same gates so a v1 stream claiming
//! v2 features is flagged as corrupt.

use quiver_core::error::{Error, Result};
use quiver_core::loc::Location;
use quiver_core::numeric::ArithOp;
use quiver_core::{RegId, StateId};
use quiver_ops::aggr::AggrKind;
use quiver_ops::build::CompiledPlan;
use quiver_ops::node::{AggrColumn, JoinPred, NodeMeta, PlanNode, SortSpec};

use crate::bytes::{Reader, Writer};
use crate::value::{read_value, write_value};

pub const MAGIC: u32 = 0x4C50_5651; // "QVPL"
/// Oldest format this build can read and write.
pub const VERSION_BASE: u16 = 1;
/// Current format. v2 added per-key NULL placement on sort and the
/// numeric-count aggregate.
pub const VERSION_CURRENT: u16 = 2;

const K_CONST: u8 = 1;
const K_SEQ_CONST: u8 = 2;
const K_VAR_REF: u8 = 3;
const K_FIELD_STEP: u8 = 4;
const K_ARITH: u8 = 5;
const K_NEGATE: u8 = 6;
const K_NOT: u8 = 7;
const K_FILTER: u8 = 8;
const K_OFFSET_LIMIT: u8 = 9;
const K_GROUP: u8 = 10;
const K_SEQ_AGGR: u8 = 11;
const K_SORT: u8 = 12;
const K_JOIN: u8 = 13;
const K_IN: u8 = 14;
const K_TABLE_SCAN: u8 = 15;
const K_DELETE: u8 = 16;
const K_UPDATE: u8 = 17;
const K_INDEX_SIZE: u8 = 18;

/// Lowest format version able to carry this plan.
pub fn required_version(node: &PlanNode) -> u16 {
    let own = match node {
        PlanNode::Sort { specs, .. } if specs.iter().any(|s| s.nulls_first) => 2,
        PlanNode::SeqAggr {
            kind: AggrKind::CountNumeric,
            ..
        } => 2,
        PlanNode::Group { aggrs, .. }
            if aggrs.iter().any(|c| c.kind == AggrKind::CountNumeric) =>
        {
            2
        }
        _ => VERSION_BASE,
    };
    node.children()
        .into_iter()
        .map(required_version)
        .fold(own, u16::max)
}

pub fn encode_plan(plan: &CompiledPlan, version: u16) -> Result<Vec<u8>> {
    if !(VERSION_BASE..=VERSION_CURRENT).contains(&version) {
        return Err(Error::Version(format!(
            "cannot write format version {version}; this build writes {VERSION_BASE}..={VERSION_CURRENT}"
        )));
    }
    let needed = required_version(&plan.root);
    if needed > version {
        return Err(Error::Version(format!(
            "plan requires format version {needed}, negotiated {version}"
        )));
    }
    let mut w = Writer::new();
    w.u32(MAGIC);
    w.u16(version);
    w.varint(plan.reg_count as u64);
    w.varint(plan.state_count as u64);
    write_node(&mut w, &plan.root);
    Ok(w.into_bytes())
}

pub fn decode_plan(bytes: &[u8]) -> Result<CompiledPlan> {
    let mut r = Reader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(Error::Wire(format!(
            "bad magic {magic:#010x}, expected {MAGIC:#010x}"
        )));
    }
    let version = r.u16()?;
    if !(VERSION_BASE..=VERSION_CURRENT).contains(&version) {
        return Err(Error::Version(format!(
            "unsupported format version {version}; this build reads {VERSION_BASE}..={VERSION_CURRENT}"
        )));
    }
    let reg_count = read_count(&mut r, "register")?;
    let state_count = read_count(&mut r, "state")?;
    let root = read_node(&mut r, version)?;
    if r.remaining() != 0 {
        return Err(Error::Wire(format!(
            "{} trailing bytes after plan",
            r.remaining()
        )));
    }
    check_ids(&root, reg_count, state_count)?;
    Ok(CompiledPlan {
        root,
        reg_count,
        state_count,
    })
}

/// Upper bound on the context dimensions a stream may declare. The runtime
/// allocates one slot per declared register/state up front.
const MAX_CONTEXT_SLOTS: u64 = 1 << 20;

fn read_count(r: &mut Reader<'_>, what: &str) -> Result<usize> {
    let v = r.varint()?;
    if v > MAX_CONTEXT_SLOTS {
        return Err(Error::Wire(format!(
            "{what} count {v} exceeds the {MAX_CONTEXT_SLOTS} slot limit"
        )));
    }
    Ok(v as usize)
}

/// Every register and state slot a node names must fall inside the declared
/// context dimensions; the runtime indexes both without rechecking.
fn check_ids(node: &PlanNode, reg_count: usize, state_count: usize) -> Result<()> {
    let reg_ok = |id: RegId| {
        if id.index() >= reg_count {
            return Err(Error::Wire(format!(
                "register {} out of range, plan declares {reg_count}",
                id.get()
            )));
        }
        Ok(())
    };
    let state_ok = |id: StateId| {
        if id.index() >= state_count {
            return Err(Error::Wire(format!(
                "state slot {} out of range, plan declares {state_count}",
                id.get()
            )));
        }
        Ok(())
    };
    reg_ok(node.result_reg())?;
    state_ok(node.state_id())?;
    match node {
        PlanNode::VarRef { source, .. } => reg_ok(*source)?,
        PlanNode::NestedLoopJoin {
            preds,
            branch_scans,
            ..
        } => {
            for pred in preds {
                reg_ok(pred.var_reg)?;
            }
            for id in branch_scans {
                state_ok(*id)?;
            }
        }
        _ => {}
    }
    for child in node.children() {
        check_ids(child, reg_count, state_count)?;
    }
    Ok(())
}

fn write_meta(w: &mut Writer, meta: &NodeMeta) {
    w.varint(u64::from(meta.result_reg.get()));
    w.varint(u64::from(meta.state_id.get()));
    w.varint(u64::from(meta.loc.line));
    w.varint(u64::from(meta.loc.column));
}

fn read_meta(r: &mut Reader<'_>) -> Result<NodeMeta> {
    let result_reg = RegId::new(read_u32(r)?);
    let state_id = StateId::new(read_u32(r)?);
    let line = read_u32(r)?;
    let column = read_u32(r)?;
    Ok(NodeMeta {
        result_reg,
        state_id,
        loc: Location::new(line, column),
    })
}

fn read_u32(r: &mut Reader<'_>) -> Result<u32> {
    let v = r.varint()?;
    u32::try_from(v).map_err(|_| Error::Wire(format!("varint {v} exceeds u32")))
}

pub(crate) fn arith_op_code(op: ArithOp) -> u8 {
    match op {
        ArithOp::Add => 0,
        ArithOp::Sub => 1,
        ArithOp::Mul => 2,
        ArithOp::Div => 3,
        ArithOp::IDiv => 4,
    }
}

fn arith_op_from(code: u8) -> Result<ArithOp> {
    Ok(match code {
        0 => ArithOp::Add,
        1 => ArithOp::Sub,
        2 => ArithOp::Mul,
        3 => ArithOp::Div,
        4 => ArithOp::IDiv,
        other => return Err(Error::Wire(format!("unknown arithmetic op code {other}"))),
    })
}

fn write_aggr_kind(w: &mut Writer, kind: AggrKind) {
    match kind {
        AggrKind::Count => w.u8(0),
        AggrKind::CountNumeric => w.u8(1),
        AggrKind::Sum => w.u8(2),
        AggrKind::Min => w.u8(3),
        AggrKind::Max => w.u8(4),
        AggrKind::Collect { distinct } => {
            w.u8(5);
            w.bool(distinct);
        }
    }
}

fn read_aggr_kind(r: &mut Reader<'_>, version: u16) -> Result<AggrKind> {
    Ok(match r.u8()? {
        0 => AggrKind::Count,
        1 => {
            if version < 2 {
                return Err(Error::Wire(
                    "numeric-count aggregate in a version 1 stream".into(),
                ));
            }
            AggrKind::CountNumeric
        }
        2 => AggrKind::Sum,
        3 => AggrKind::Min,
        4 => AggrKind::Max,
        5 => AggrKind::Collect {
            distinct: r.bool()?,
        },
        other => return Err(Error::Wire(format!("unknown aggregate code {other}"))),
    })
}

fn write_nodes(w: &mut Writer, nodes: &[PlanNode]) {
    w.varint(nodes.len() as u64);
    for n in nodes {
        write_node(w, n);
    }
}

fn read_nodes(r: &mut Reader<'_>, version: u16) -> Result<Vec<PlanNode>> {
    let n = r.varint()? as usize;
    let mut out = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        out.push(read_node(r, version)?);
    }
    Ok(out)
}

fn write_opt_node(w: &mut Writer, node: Option<&PlanNode>) {
    match node {
        Some(n) => {
            w.bool(true);
            write_node(w, n);
        }
        None => w.bool(false),
    }
}

fn read_opt_node(r: &mut Reader<'_>, version: u16) -> Result<Option<Box<PlanNode>>> {
    if r.bool()? {
        Ok(Some(Box::new(read_node(r, version)?)))
    } else {
        Ok(None)
    }
}

fn write_node(w: &mut Writer, node: &PlanNode) {
    match node {
        PlanNode::Const { meta, value } => {
            w.u8(K_CONST);
            write_meta(w, meta);
            write_value(w, value);
        }
        PlanNode::SeqConst { meta, items } => {
            w.u8(K_SEQ_CONST);
            write_meta(w, meta);
            w.varint(items.len() as u64);
            for item in items {
                write_value(w, item);
            }
        }
        PlanNode::VarRef { meta, name, source } => {
            w.u8(K_VAR_REF);
            write_meta(w, meta);
            w.str(name);
            w.varint(u64::from(source.get()));
        }
        PlanNode::FieldStep { meta, input, field } => {
            w.u8(K_FIELD_STEP);
            write_meta(w, meta);
            w.str(field);
            write_node(w, input);
        }
        PlanNode::Arith {
            meta,
            ops,
            operands,
        } => {
            w.u8(K_ARITH);
            write_meta(w, meta);
            w.varint(ops.len() as u64);
            for op in ops {
                w.u8(arith_op_code(*op));
            }
            write_nodes(w, operands);
        }
        PlanNode::Negate { meta, input } => {
            w.u8(K_NEGATE);
            write_meta(w, meta);
            write_node(w, input);
        }
        PlanNode::Not { meta, input } => {
            w.u8(K_NOT);
            write_meta(w, meta);
            write_node(w, input);
        }
        PlanNode::Filter {
            meta,
            input,
            predicate,
        } => {
            w.u8(K_FILTER);
            write_meta(w, meta);
            write_node(w, input);
            write_node(w, predicate);
        }
        PlanNode::OffsetLimit {
            meta,
            input,
            offset,
            limit,
        } => {
            w.u8(K_OFFSET_LIMIT);
            write_meta(w, meta);
            write_node(w, input);
            write_opt_node(w, offset.as_deref());
            write_opt_node(w, limit.as_deref());
        }
        PlanNode::Group {
            meta,
            input,
            grouping,
            aggrs,
        } => {
            w.u8(K_GROUP);
            write_meta(w, meta);
            write_node(w, input);
            w.varint(grouping.len() as u64);
            for (name, expr) in grouping {
                w.str(name);
                write_node(w, expr);
            }
            w.varint(aggrs.len() as u64);
            for col in aggrs {
                w.str(&col.name);
                write_aggr_kind(w, col.kind);
                write_node(w, &col.input);
            }
        }
        PlanNode::SeqAggr { meta, input, kind } => {
            w.u8(K_SEQ_AGGR);
            write_meta(w, meta);
            write_aggr_kind(w, *kind);
            write_node(w, input);
        }
        PlanNode::Sort { meta, input, specs } => {
            w.u8(K_SORT);
            write_meta(w, meta);
            w.varint(specs.len() as u64);
            for spec in specs {
                w.str(&spec.field);
                w.bool(spec.descending);
                w.bool(spec.nulls_first);
            }
            write_node(w, input);
        }
        PlanNode::NestedLoopJoin {
            meta,
            branches,
            preds,
            branch_scans,
        } => {
            w.u8(K_JOIN);
            write_meta(w, meta);
            write_nodes(w, branches);
            w.varint(preds.len() as u64);
            for pred in preds {
                w.varint(pred.outer_branch as u64);
                w.str(&pred.field);
                w.varint(u64::from(pred.var_reg.get()));
            }
            w.varint(branch_scans.len() as u64);
            for id in branch_scans {
                w.varint(u64::from(id.get()));
            }
        }
        PlanNode::In {
            meta,
            key,
            candidates,
        } => {
            w.u8(K_IN);
            write_meta(w, meta);
            write_nodes(w, key);
            w.varint(candidates.len() as u64);
            for row in candidates {
                for component in row {
                    write_node(w, component);
                }
            }
        }
        PlanNode::TableScan { meta, table } => {
            w.u8(K_TABLE_SCAN);
            write_meta(w, meta);
            w.str(table);
        }
        PlanNode::Delete { meta, table, input } => {
            w.u8(K_DELETE);
            write_meta(w, meta);
            w.str(table);
            write_node(w, input);
        }
        PlanNode::Update {
            meta,
            table,
            field,
            value,
            input,
        } => {
            w.u8(K_UPDATE);
            write_meta(w, meta);
            w.str(table);
            w.str(field);
            write_node(w, value);
            write_node(w, input);
        }
        PlanNode::IndexSize { meta, table, index } => {
            w.u8(K_INDEX_SIZE);
            write_meta(w, meta);
            w.str(table);
            w.str(index);
        }
    }
}

fn read_node(r: &mut Reader<'_>, version: u16) -> Result<PlanNode> {
    let kind = r.u8()?;
    Ok(match kind {
        K_CONST => {
            let meta = read_meta(r)?;
            let value = read_value(r)?;
            PlanNode::Const { meta, value }
        }
        K_SEQ_CONST => {
            let meta = read_meta(r)?;
            let n = r.varint()? as usize;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            PlanNode::SeqConst { meta, items }
        }
        K_VAR_REF => {
            let meta = read_meta(r)?;
            let name = r.str()?;
            let source = RegId::new(read_u32(r)?);
            PlanNode::VarRef { meta, name, source }
        }
        K_FIELD_STEP => {
            let meta = read_meta(r)?;
            let field = r.str()?;
            let input = Box::new(read_node(r, version)?);
            PlanNode::FieldStep { meta, input, field }
        }
        K_ARITH => {
            let meta = read_meta(r)?;
            let n = r.varint()? as usize;
            let mut ops = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                ops.push(arith_op_from(r.u8()?)?);
            }
            let operands = read_nodes(r, version)?;
            if operands.len() != ops.len() {
                return Err(Error::Wire(format!(
                    "arithmetic node has {} operators but {} operands",
                    ops.len(),
                    operands.len()
                )));
            }
            PlanNode::Arith {
                meta,
                ops,
                operands,
            }
        }
        K_NEGATE => {
            let meta = read_meta(r)?;
            let input = Box::new(read_node(r, version)?);
            PlanNode::Negate { meta, input }
        }
        K_NOT => {
            let meta = read_meta(r)?;
            let input = Box::new(read_node(r, version)?);
            PlanNode::Not { meta, input }
        }
        K_FILTER => {
            let meta = read_meta(r)?;
            let input = Box::new(read_node(r, version)?);
            let predicate = Box::new(read_node(r, version)?);
            PlanNode::Filter {
                meta,
                input,
                predicate,
            }
        }
        K_OFFSET_LIMIT => {
            let meta = read_meta(r)?;
            let input = Box::new(read_node(r, version)?);
            let offset = read_opt_node(r, version)?;
            let limit = read_opt_node(r, version)?;
            PlanNode::OffsetLimit {
                meta,
                input,
                offset,
                limit,
            }
        }
        K_GROUP => {
            let meta = read_meta(r)?;
            let input = Box::new(read_node(r, version)?);
            let n = r.varint()? as usize;
            let mut grouping = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                let name = r.str()?;
                let expr = read_node(r, version)?;
                grouping.push((name, expr));
            }
            let n = r.varint()? as usize;
            let mut aggrs = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                let name = r.str()?;
                let kind = read_aggr_kind(r, version)?;
                let input = read_node(r, version)?;
                aggrs.push(AggrColumn { name, kind, input });
            }
            PlanNode::Group {
                meta,
                input,
                grouping,
                aggrs,
            }
        }
        K_SEQ_AGGR => {
            let meta = read_meta(r)?;
            let kind = read_aggr_kind(r, version)?;
            let input = Box::new(read_node(r, version)?);
            PlanNode::SeqAggr { meta, input, kind }
        }
        K_SORT => {
            let meta = read_meta(r)?;
            let n = r.varint()? as usize;
            let mut specs = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                let field = r.str()?;
                let descending = r.bool()?;
                let nulls_first = r.bool()?;
                if nulls_first && version < 2 {
                    return Err(Error::Wire(
                        "per-key NULL placement in a version 1 stream".into(),
                    ));
                }
                specs.push(SortSpec {
                    field,
                    descending,
                    nulls_first,
                });
            }
            let input = Box::new(read_node(r, version)?);
            PlanNode::Sort { meta, input, specs }
        }
        K_JOIN => {
            let meta = read_meta(r)?;
            let branches = read_nodes(r, version)?;
            let n = r.varint()? as usize;
            let mut preds = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                let outer_branch = r.varint()? as usize;
                let field = r.str()?;
                let var_reg = RegId::new(read_u32(r)?);
                preds.push(JoinPred {
                    outer_branch,
                    field,
                    var_reg,
                });
            }
            let n = r.varint()? as usize;
            let mut branch_scans = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                branch_scans.push(StateId::new(read_u32(r)?));
            }
            if branch_scans.len() != branches.len() {
                return Err(Error::Wire(format!(
                    "join has {} branches but {} scan ids",
                    branches.len(),
                    branch_scans.len()
                )));
            }
            PlanNode::NestedLoopJoin {
                meta,
                branches,
                preds,
                branch_scans,
            }
        }
        K_IN => {
            let meta = read_meta(r)?;
            let key = read_nodes(r, version)?;
            let rows = r.varint()? as usize;
            let mut candidates = Vec::with_capacity(rows.min(1024));
            for _ in 0..rows {
                let mut row = Vec::with_capacity(key.len());
                for _ in 0..key.len() {
                    row.push(read_node(r, version)?);
                }
                candidates.push(row);
            }
            PlanNode::In {
                meta,
                key,
                candidates,
            }
        }
        K_TABLE_SCAN => {
            let meta = read_meta(r)?;
            let table = r.str()?;
            PlanNode::TableScan { meta, table }
        }
        K_DELETE => {
            let meta = read_meta(r)?;
            let table = r.str()?;
            let input = Box::new(read_node(r, version)?);
            PlanNode::Delete { meta, table, input }
        }
        K_UPDATE => {
            let meta = read_meta(r)?;
            let table = r.str()?;
            let field = r.str()?;
            let value = Box::new(read_node(r, version)?);
            let input = Box::new(read_node(r, version)?);
            PlanNode::Update {
                meta,
                table,
                field,
                value,
                input,
            }
        }
        K_INDEX_SIZE => {
            let meta = read_meta(r)?;
            let table = r.str()?;
            let index = r.str()?;
            PlanNode::IndexSize { meta, table, index }
        }
        other => return Err(Error::Wire(format!("unknown node discriminant {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::value::Value;
    use quiver_ops::build::PlanBuilder;

    const LOC: Location = Location::new(3, 14);

    fn sample_plan(nulls_first: bool) -> CompiledPlan {
        let mut b = PlanBuilder::new();
        let scan = b.table_scan("users", LOC);
        let sorted = b.sort(
            scan,
            vec![SortSpec {
                field: "age".into(),
                descending: true,
                nulls_first,
            }],
            LOC,
        );
        let off = b.constant(2i32, LOC);
        let lim = b.constant(10i32, LOC);
        let window = b.offset_limit(sorted, Some(off), Some(lim), LOC);
        b.finish(window)
    }

    #[test]
    fn plan_round_trips_at_current_version() {
        let plan = sample_plan(true);
        let bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        let back = decode_plan(&bytes).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn plan_round_trips_at_base_version() {
        let plan = sample_plan(false);
        let bytes = encode_plan(&plan, VERSION_BASE).unwrap();
        let back = decode_plan(&bytes).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn gated_feature_fails_fast_at_base_version() {
        let plan = sample_plan(true);
        let err = encode_plan(&plan, VERSION_BASE).unwrap_err();
        assert!(matches!(err, Error::Version(_)));
    }

    #[test]
    fn numeric_count_is_version_gated() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let agg = b.seq_aggr(src, AggrKind::CountNumeric, LOC);
        let plan = b.finish(agg);
        assert!(matches!(
            encode_plan(&plan, VERSION_BASE).unwrap_err(),
            Error::Version(_)
        ));
        let bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        assert_eq!(decode_plan(&bytes).unwrap(), plan);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let plan = sample_plan(false);
        let mut bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(decode_plan(&bytes).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn out_of_range_register_is_rejected() {
        let mut b = PlanBuilder::new();
        let c = b.constant(1i64, LOC);
        let mut plan = b.finish(c);
        // Header disagrees with the ids the node tree carries.
        plan.reg_count = 0;
        let bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        assert!(matches!(decode_plan(&bytes).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn out_of_range_state_slot_is_rejected() {
        let mut b = PlanBuilder::new();
        let c = b.constant(1i64, LOC);
        let mut plan = b.finish(c);
        plan.state_count = 0;
        let bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        assert!(matches!(decode_plan(&bytes).unwrap_err(), Error::Wire(_)));
    }

    #[test]
    fn absurd_context_dimensions_are_rejected() {
        let mut w = Writer::new();
        w.u32(MAGIC);
        w.u16(VERSION_CURRENT);
        w.varint(u64::MAX / 2);
        w.varint(0);
        assert!(matches!(
            decode_plan(&w.into_bytes()).unwrap_err(),
            Error::Wire(_)
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let plan = sample_plan(false);
        let mut bytes = encode_plan(&plan, VERSION_CURRENT).unwrap();
        bytes[4] = 0x63; // version field, little endian
        bytes[5] = 0x00;
        assert!(matches!(
            decode_plan(&bytes).unwrap_err(),
            Error::Version(_)
        ));
    }
}
