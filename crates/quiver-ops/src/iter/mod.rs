//! The pull protocol: open / next / reset / close / suspend.
//!
//! Dispatch is by free functions matching on the node kind; operator state is
//! re-borrowed from the context between child calls, so recursion over the
//! tree never holds two mutable borrows at once.
//!
//! Protocol rules every operator follows:
//! - `next` after exhaustion keeps returning false without side effects;
//! - a false `next` with the context's reached-limit flag set is a pause,
//!   not exhaustion: the operator stays `Running` and may produce again
//!   after resumption;
//! - `reset` rewinds iteration but deliberately keeps aggregation running
//!   totals; only `extract(reset)` clears those;
//! - `close` is idempotent and tolerates a never-opened tree.

mod arith;
mod extern_ops;
mod group;
mod inlist;
mod join;
mod misc;
mod sort;

use quiver_core::error::{Error, Result};
use quiver_core::value::Value;

use crate::aggr::AggrAcc;
use crate::context::RuntimeContext;
use crate::external::{WorkerKind, WorkerRequest};
use crate::node::PlanNode;
use crate::resume::{ResumeEntry, ResumeInfo};
use crate::state::{
    ExternalState, GroupState, JoinState, OffsetLimitState, OpState, SeqAggrState, SeqConstState,
    SimpleState, SortState, Step,
};

/// Install execution state for the whole subtree. Operators consume their
/// entries from the context's incoming resume snapshot here; a scan nested
/// under a join sees its entry only after the join has adjusted its
/// `on_current` flag, because parents open before children.
pub fn open(node: &PlanNode, ctx: &mut RuntimeContext) -> Result<()> {
    let id = node.state_id();
    ctx.trace(node.kind_name(), "open");
    match node {
        PlanNode::Const { .. }
        | PlanNode::VarRef { .. }
        | PlanNode::FieldStep { .. }
        | PlanNode::Arith { .. }
        | PlanNode::Negate { .. }
        | PlanNode::Not { .. }
        | PlanNode::Filter { .. }
        | PlanNode::In { .. } => {
            ctx.set_state(id, OpState::Simple(SimpleState::default()));
        }

        PlanNode::SeqConst { .. } => {
            let idx = match ctx.take_resume_entry(id) {
                Some(ResumeEntry::Seq { idx }) => idx,
                _ => 0,
            };
            ctx.set_state(id, OpState::SeqConst(SeqConstState { step: Step::Fresh, idx }));
        }

        PlanNode::OffsetLimit { .. } => {
            let mut st = OffsetLimitState::default();
            if let Some(ResumeEntry::OffsetLimit { skipped, emitted }) = ctx.take_resume_entry(id) {
                st.skipped = skipped;
                st.emitted = emitted;
            }
            ctx.set_state(id, OpState::OffsetLimit(st));
        }

        PlanNode::Sort { .. } => {
            let mut st = SortState::default();
            if let Some(ResumeEntry::Sort {
                rows,
                sorted,
                next_idx,
                input_status,
            }) = ctx.take_resume_entry(id)
            {
                // The buffer counts against this execution's ceiling too.
                let bytes: u64 = rows.iter().map(Value::size_bytes).sum();
                ctx.consume(bytes, "sort")?;
                st.rows = rows;
                st.sorted = sorted;
                st.next_idx = next_idx;
                st.input_status = input_status;
            }
            ctx.set_state(id, OpState::Sort(st));
        }

        PlanNode::Group { aggrs, .. } => {
            let mut st = GroupState::default();
            match ctx.take_resume_entry(id) {
                Some(ResumeEntry::Group { key, partials }) => {
                    if partials.len() != aggrs.len() {
                        return Err(Error::invariant(format!(
                            "group resume carries {} partials for {} columns",
                            partials.len(),
                            aggrs.len()
                        )));
                    }
                    st.cur_key = key;
                    for (col, partial) in aggrs.iter().zip(partials.iter()) {
                        st.accs.push(AggrAcc::seed(col.kind, Some(partial))?);
                    }
                }
                _ => {
                    for col in aggrs {
                        st.accs.push(AggrAcc::seed(col.kind, None)?);
                    }
                }
            }
            ctx.set_state(id, OpState::Group(st));
        }

        PlanNode::SeqAggr { kind, .. } => {
            let partial = match ctx.take_resume_entry(id) {
                Some(ResumeEntry::SeqAggr { partial }) => Some(partial),
                _ => None,
            };
            let acc = AggrAcc::seed(*kind, partial.as_ref())?;
            ctx.set_state(
                id,
                OpState::SeqAggr(SeqAggrState {
                    step: Step::Fresh,
                    acc: Some(acc),
                }),
            );
        }

        PlanNode::NestedLoopJoin {
            branches,
            branch_scans,
            ..
        } => {
            let n = branches.len();
            let mut keep_position = vec![false; n];
            for i in 0..n {
                keep_position[i] = ctx.has_resume_entry(branch_scans[i]);
            }
            // Branch i resumes on its last row exactly when branch i+1 has
            // a recorded position to replay underneath it.
            for i in 0..n {
                let on = i + 1 < n && ctx.has_resume_entry(branch_scans[i + 1]);
                ctx.mark_scan_on_current(branch_scans[i], on);
            }
            ctx.set_state(
                id,
                OpState::Join(JoinState {
                    step: Step::Fresh,
                    depth: 0,
                    keep_position,
                }),
            );
        }

        PlanNode::TableScan { meta, table } => {
            install_worker(
                ctx,
                WorkerRequest {
                    kind: WorkerKind::TableScan,
                    table: table.clone(),
                    index: None,
                    field: None,
                    result_reg: meta.result_reg,
                    state_id: meta.state_id,
                    arg_regs: Vec::new(),
                    loc: meta.loc,
                },
            )?;
        }
        PlanNode::Delete { meta, table, input } => {
            install_worker(
                ctx,
                WorkerRequest {
                    kind: WorkerKind::Delete,
                    table: table.clone(),
                    index: None,
                    field: None,
                    result_reg: meta.result_reg,
                    state_id: meta.state_id,
                    arg_regs: vec![input.result_reg()],
                    loc: meta.loc,
                },
            )?;
        }
        PlanNode::Update {
            meta,
            table,
            field,
            value,
            input,
        } => {
            install_worker(
                ctx,
                WorkerRequest {
                    kind: WorkerKind::Update,
                    table: table.clone(),
                    index: None,
                    field: Some(field.clone()),
                    result_reg: meta.result_reg,
                    state_id: meta.state_id,
                    arg_regs: vec![input.result_reg(), value.result_reg()],
                    loc: meta.loc,
                },
            )?;
        }
        PlanNode::IndexSize { meta, table, index } => {
            install_worker(
                ctx,
                WorkerRequest {
                    kind: WorkerKind::IndexSize,
                    table: table.clone(),
                    index: Some(index.clone()),
                    field: None,
                    result_reg: meta.result_reg,
                    state_id: meta.state_id,
                    arg_regs: Vec::new(),
                    loc: meta.loc,
                },
            )?;
        }
    }

    for child in node.children() {
        open(child, ctx)?;
    }
    Ok(())
}

fn install_worker(ctx: &mut RuntimeContext, req: WorkerRequest) -> Result<()> {
    let id = req.state_id;
    ctx.set_state(id, OpState::External(ExternalState::default()));
    let mut worker = ctx.factory().make(&req)?;
    worker.open(ctx)?;
    ctx.put_worker(id, worker)
}

/// Pull the next item. A true return means the node's result register holds
/// the item; false means exhaustion, or a pause when the context's
/// reached-limit flag is set.
pub fn next(node: &PlanNode, ctx: &mut RuntimeContext) -> Result<bool> {
    ctx.trace(node.kind_name(), "next");
    match node {
        PlanNode::Const { meta, value } => misc::next_const(meta, value, ctx),
        PlanNode::SeqConst { meta, items } => misc::next_seq_const(meta, items, ctx),
        PlanNode::VarRef { meta, source, .. } => misc::next_var_ref(meta, *source, ctx),
        PlanNode::FieldStep { meta, input, field } => {
            misc::next_field_step(meta, input, field, ctx)
        }
        PlanNode::Arith {
            meta,
            ops,
            operands,
        } => arith::next_arith(meta, ops, operands, ctx),
        PlanNode::Negate { meta, input } => misc::next_negate(meta, input, ctx),
        PlanNode::Not { meta, input } => misc::next_not(meta, input, ctx),
        PlanNode::Filter {
            meta,
            input,
            predicate,
        } => misc::next_filter(meta, input, predicate, ctx),
        PlanNode::OffsetLimit {
            meta,
            input,
            offset,
            limit,
        } => misc::next_offset_limit(meta, input, offset.as_deref(), limit.as_deref(), ctx),
        PlanNode::Group {
            meta,
            input,
            grouping,
            aggrs,
        } => group::next_group(meta, input, grouping, aggrs, ctx),
        PlanNode::SeqAggr { meta, input, kind } => group::next_seq_aggr(meta, input, *kind, ctx),
        PlanNode::Sort { meta, input, specs } => sort::next_sort(meta, input, specs, ctx),
        PlanNode::NestedLoopJoin {
            meta,
            branches,
            preds,
            ..
        } => join::next_join(meta, branches, preds, ctx),
        PlanNode::In {
            meta,
            key,
            candidates,
        } => inlist::next_in(meta, key, candidates, ctx),
        PlanNode::TableScan { meta, .. } | PlanNode::IndexSize { meta, .. } => {
            extern_ops::next_source(meta, ctx)
        }
        PlanNode::Delete { meta, input, .. } => extern_ops::next_per_row(meta, input, None, ctx),
        PlanNode::Update {
            meta, value, input, ..
        } => extern_ops::next_per_row(meta, input, Some(value), ctx),
    }
}

/// Rewind the subtree for another iteration pass. Aggregation running
/// totals survive; everything positional starts over.
pub fn reset(node: &PlanNode, ctx: &mut RuntimeContext) -> Result<()> {
    let id = node.state_id();
    if matches!(ctx.state(id), OpState::Unset) {
        return Err(Error::invariant(format!(
            "reset of a never-opened {} node",
            node.kind_name()
        )));
    }
    match node {
        PlanNode::Const { .. }
        | PlanNode::VarRef { .. }
        | PlanNode::FieldStep { .. }
        | PlanNode::Arith { .. }
        | PlanNode::Negate { .. }
        | PlanNode::Not { .. }
        | PlanNode::Filter { .. }
        | PlanNode::In { .. } => {
            ctx.simple_mut(id)?.step = Step::Fresh;
        }
        PlanNode::SeqConst { .. } => {
            let st = ctx.seq_const_mut(id)?;
            st.step = Step::Fresh;
            st.idx = 0;
        }
        PlanNode::OffsetLimit { .. } => {
            let st = ctx.offset_limit_mut(id)?;
            st.step = Step::Fresh;
            st.skipped = 0;
            st.emitted = 0;
        }
        PlanNode::Sort { .. } => {
            let st = ctx.sort_mut(id)?;
            st.step = Step::Fresh;
            st.rows.clear();
            st.sorted = false;
            st.next_idx = 0;
            st.input_status = Default::default();
        }
        PlanNode::Group { .. } => {
            // Accumulators and the in-flight key carry across resets.
            ctx.group_mut(id)?.step = Step::Fresh;
        }
        PlanNode::SeqAggr { .. } => {
            ctx.seq_aggr_mut(id)?.step = Step::Fresh;
        }
        PlanNode::NestedLoopJoin { .. } => {
            let st = ctx.join_mut(id)?;
            st.step = Step::Fresh;
            st.depth = 0;
            st.keep_position.iter_mut().for_each(|k| *k = false);
        }
        PlanNode::TableScan { .. }
        | PlanNode::Delete { .. }
        | PlanNode::Update { .. }
        | PlanNode::IndexSize { .. } => {
            let mut worker = ctx.take_worker(id)?;
            let r = worker.reset(ctx);
            ctx.put_worker(id, worker)?;
            r?;
            ctx.external_mut(id)?.step = Step::Fresh;
        }
    }
    for child in node.children() {
        reset(child, ctx)?;
    }
    Ok(())
}

/// Release execution state. Safe on a tree that was never opened.
pub fn close(node: &PlanNode, ctx: &mut RuntimeContext) {
    for child in node.children() {
        close(child, ctx);
    }
    let id = node.state_id();
    if let Ok(st) = ctx.external_mut(id) {
        if let Some(mut worker) = st.worker.take() {
            worker.close(ctx);
        }
    }
    ctx.clear_state(id);
}

/// Snapshot every stateful operator's progress for the next batch.
pub fn suspend(node: &PlanNode, ctx: &mut RuntimeContext, info: &mut ResumeInfo) -> Result<()> {
    let id = node.state_id();
    match node {
        PlanNode::SeqConst { .. } => {
            let st = ctx.seq_const_mut(id)?;
            if st.step == Step::Running {
                info.insert(id, ResumeEntry::Seq { idx: st.idx });
            }
        }
        PlanNode::OffsetLimit { .. } => {
            let st = ctx.offset_limit_mut(id)?;
            if st.step == Step::Running {
                info.insert(
                    id,
                    ResumeEntry::OffsetLimit {
                        skipped: st.skipped,
                        emitted: st.emitted,
                    },
                );
            }
        }
        PlanNode::Sort { .. } => {
            let st = ctx.sort_mut(id)?;
            if st.step == Step::Running {
                info.insert(
                    id,
                    ResumeEntry::Sort {
                        rows: st.rows.clone(),
                        sorted: st.sorted,
                        next_idx: st.next_idx,
                        input_status: st.input_status,
                    },
                );
            }
        }
        PlanNode::Group { .. } => {
            let st = ctx.group_mut(id)?;
            if st.step == Step::Running {
                let partials: Vec<Value> = st.accs.iter_mut().map(|a| a.extract(false)).collect();
                let key = st.cur_key.clone();
                info.insert(id, ResumeEntry::Group { key, partials });
            }
        }
        PlanNode::SeqAggr { .. } => {
            let st = ctx.seq_aggr_mut(id)?;
            if st.step == Step::Running {
                if let Some(acc) = st.acc.as_mut() {
                    let partial = acc.extract(false);
                    info.insert(id, ResumeEntry::SeqAggr { partial });
                }
            }
        }
        PlanNode::TableScan { .. }
        | PlanNode::Delete { .. }
        | PlanNode::Update { .. }
        | PlanNode::IndexSize { .. } => {
            let worker = ctx.take_worker(id)?;
            let r = worker.suspend(info);
            ctx.put_worker(id, worker)?;
            r?;
        }
        _ => {}
    }
    for child in node.children() {
        suspend(child, ctx, info)?;
    }
    Ok(())
}

/// Evaluate an expression subtree expected to produce at most one item.
/// Produces `Empty` for "nothing"; more than one item is a cardinality
/// error. The value is also left in the subtree's result register.
pub(crate) fn eval_single(node: &PlanNode, ctx: &mut RuntimeContext) -> Result<Value> {
    reset(node, ctx)?;
    if !next(node, ctx)? {
        return Ok(Value::Empty);
    }
    let v = ctx.reg(node.result_reg()).clone();
    if next(node, ctx)? {
        return Err(Error::query(
            format!("{} expression produced more than one item", node.kind_name()),
            node.loc(),
        ));
    }
    // Re-publish: the second pull may have clobbered the register.
    ctx.set_reg(node.result_reg(), v.clone());
    Ok(v)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quiver_core::config::{ExecConfig, ExecRole};
    use quiver_core::loc::Location;
    use quiver_core::numeric::ArithOp;
    use quiver_core::value::Record;

    use super::*;
    use crate::aggr::AggrKind;
    use crate::build::{CompiledPlan, PlanBuilder};
    use crate::external::{WorkerFactory, WorkerIter, WorkerRequest};
    use crate::node::SortSpec;

    struct NoStorage;

    impl WorkerFactory for NoStorage {
        fn make(&self, req: &WorkerRequest) -> Result<Box<dyn WorkerIter>> {
            Err(Error::invariant(format!(
                "no storage in this test (table '{}')",
                req.table
            )))
        }
    }

    const LOC: Location = Location::new(1, 1);

    fn context(plan: &CompiledPlan) -> RuntimeContext {
        RuntimeContext::new(
            plan.reg_count,
            plan.state_count,
            &ExecConfig::default(),
            ExecRole::Server,
            Arc::new(NoStorage),
            None,
        )
    }

    fn run_all(plan: &CompiledPlan) -> Result<Vec<Value>> {
        let mut ctx = context(plan);
        open(&plan.root, &mut ctx)?;
        let mut out = Vec::new();
        while next(&plan.root, &mut ctx)? {
            out.push(ctx.reg(plan.root.result_reg()).clone());
        }
        close(&plan.root, &mut ctx);
        Ok(out)
    }

    fn row(id: i64, score: i64) -> Value {
        Value::Record(Record::new().with("id", Value::Long(id)).with("score", Value::Long(score)))
    }

    #[test]
    fn addition_stays_integral() {
        let mut b = PlanBuilder::new();
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let sum = b
            .arith(vec![ArithOp::Add, ArithOp::Add], vec![c1, c2], LOC)
            .unwrap();
        let plan = b.finish(sum);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Int(3)]);
    }

    #[test]
    fn real_division_promotes_to_double() {
        let mut b = PlanBuilder::new();
        let c1 = b.constant(7i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let div = b
            .arith(vec![ArithOp::Mul, ArithOp::Div], vec![c1, c2], LOC)
            .unwrap();
        let plan = b.finish(div);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Double(3.5)]);
    }

    #[test]
    fn leading_subtraction_negates() {
        let mut b = PlanBuilder::new();
        let c1 = b.constant(5i32, LOC);
        let c2 = b.constant(3i32, LOC);
        let expr = b
            .arith(vec![ArithOp::Sub, ArithOp::Add], vec![c1, c2], LOC)
            .unwrap();
        let plan = b.finish(expr);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Int(-2)]);
    }

    #[test]
    fn null_operand_poisons_arithmetic() {
        let mut b = PlanBuilder::new();
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(Value::Null, LOC);
        let sum = b
            .arith(vec![ArithOp::Add, ArithOp::Add], vec![c1, c2], LOC)
            .unwrap();
        let plan = b.finish(sum);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn multi_item_operand_is_a_cardinality_error() {
        let mut b = PlanBuilder::new();
        let one = b.constant(1i64, LOC);
        let many = b.seq_const(vec![Value::Long(2), Value::Long(3)], Location::new(7, 9));
        let sum = b
            .arith(vec![ArithOp::Add, ArithOp::Add], vec![one, many], LOC)
            .unwrap();
        let plan = b.finish(sum);
        match run_all(&plan).unwrap_err() {
            Error::Query { message, loc } => {
                assert!(message.contains("more than one item"), "{message}");
                assert_eq!(loc, Location::new(7, 9));
            }
            other => panic!("expected a query error, got {other:?}"),
        }
    }

    #[test]
    fn filter_selects_on_true_only() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(
            vec![row(1, 10), row(2, 50), row(3, 90)],
            LOC,
        );
        let src_reg = src.result_reg();
        let probe = b.var_ref("row", src_reg, LOC);
        let score = b.field_step(probe, "score", LOC);
        // Keep rows whose score is in {50, 90}.
        let cand1 = b.constant(50i32, LOC);
        let cand2 = b.constant(90i32, LOC);
        let pred = b
            .in_list(vec![score], vec![vec![cand1], vec![cand2]], LOC)
            .unwrap();
        let filter = b.filter(src, pred, LOC);
        let plan = b.finish(filter);
        assert_eq!(run_all(&plan).unwrap(), vec![row(2, 50), row(3, 90)]);
    }

    #[test]
    fn membership_truth_table() {
        // 5 IN (1, 2, NULL) is NULL, never FALSE.
        let mut b = PlanBuilder::new();
        let key = b.constant(5i32, LOC);
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let cn = b.constant(Value::Null, LOC);
        let test = b
            .in_list(vec![key], vec![vec![c1], vec![c2], vec![cn]], LOC)
            .unwrap();
        let plan = b.finish(test);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Null]);

        // 2 IN (1, 2, NULL) is TRUE despite the NULL.
        let mut b = PlanBuilder::new();
        let key = b.constant(2i32, LOC);
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let cn = b.constant(Value::Null, LOC);
        let test = b
            .in_list(vec![key], vec![vec![c1], vec![c2], vec![cn]], LOC)
            .unwrap();
        let plan = b.finish(test);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Bool(true)]);

        // 5 IN (1, 2) is plain FALSE.
        let mut b = PlanBuilder::new();
        let key = b.constant(5i32, LOC);
        let c1 = b.constant(1i32, LOC);
        let c2 = b.constant(2i32, LOC);
        let test = b.in_list(vec![key], vec![vec![c1], vec![c2]], LOC).unwrap();
        let plan = b.finish(test);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Bool(false)]);
    }

    #[test]
    fn not_of_nothing_is_true() {
        let mut b = PlanBuilder::new();
        let empty = b.seq_const(vec![], LOC);
        let not = b.not(empty, LOC);
        let plan = b.finish(not);
        assert_eq!(run_all(&plan).unwrap(), vec![Value::Bool(true)]);
    }

    #[test]
    fn offset_limit_windows_the_stream() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(
            (0..10).map(Value::Long).collect(),
            LOC,
        );
        let off = b.constant(3i32, LOC);
        let lim = b.constant(4i32, LOC);
        let window = b.offset_limit(src, Some(off), Some(lim), LOC);
        let plan = b.finish(window);
        assert_eq!(
            run_all(&plan).unwrap(),
            (3..7).map(Value::Long).collect::<Vec<_>>()
        );
    }

    #[test]
    fn negative_offset_is_a_query_error() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let off = b.constant(-1i32, LOC);
        let window = b.offset_limit(src, Some(off), None, LOC);
        let plan = b.finish(window);
        let err = run_all(&plan).unwrap_err();
        assert!(matches!(err, Error::Query { .. }));
    }

    #[test]
    fn sort_orders_with_null_placement() {
        let mut b = PlanBuilder::new();
        let rows = vec![
            row(1, 30),
            Value::Record(Record::new().with("id", Value::Long(2)).with("score", Value::Null)),
            row(3, 10),
        ];
        let src = b.seq_const(rows, LOC);
        let sorted = b.sort(
            src,
            vec![SortSpec {
                field: "score".into(),
                descending: false,
                nulls_first: false,
            }],
            LOC,
        );
        let plan = b.finish(sorted);
        let out = run_all(&plan).unwrap();
        let ids: Vec<i64> = out
            .iter()
            .map(|v| match v {
                Value::Record(r) => r.get("id").and_then(Value::as_long).unwrap(),
                _ => panic!("not a record"),
            })
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn sort_rejects_complex_keys() {
        let mut b = PlanBuilder::new();
        let bad = Value::Record(
            Record::new().with("score", Value::Array(vec![Value::Long(1)])),
        );
        let src = b.seq_const(vec![bad], LOC);
        let sorted = b.sort(
            src,
            vec![SortSpec {
                field: "score".into(),
                descending: false,
                nulls_first: false,
            }],
            LOC,
        );
        let plan = b.finish(sorted);
        assert!(matches!(run_all(&plan).unwrap_err(), Error::Query { .. }));
    }

    #[test]
    fn group_emits_one_record_per_key_run() {
        let mut b = PlanBuilder::new();
        let rows = vec![row(1, 10), row(1, 20), row(2, 5)];
        let src = b.seq_const(rows, LOC);
        let src_reg = src.result_reg();

        let key_probe = b.var_ref("row", src_reg, LOC);
        let key_expr = b.field_step(key_probe, "id", LOC);
        let sum_probe = b.var_ref("row", src_reg, LOC);
        let sum_expr = b.field_step(sum_probe, "score", LOC);
        let sum_col = b.aggr_column("total", AggrKind::Sum, sum_expr);

        let group = b.group(src, vec![("id".into(), key_expr)], vec![sum_col], LOC);
        let plan = b.finish(group);

        let out = run_all(&plan).unwrap();
        assert_eq!(
            out,
            vec![
                Value::Record(
                    Record::new()
                        .with("id", Value::Long(1))
                        .with("total", Value::Long(30))
                ),
                Value::Record(
                    Record::new()
                        .with("id", Value::Long(2))
                        .with("total", Value::Long(5))
                ),
            ]
        );
    }

    #[test]
    fn seq_aggr_collect_distinct() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(
            vec![Value::Int(1), Value::Long(1), Value::Long(2)],
            LOC,
        );
        let agg = b.seq_aggr(src, AggrKind::Collect { distinct: true }, LOC);
        let plan = b.finish(agg);
        assert_eq!(
            run_all(&plan).unwrap(),
            vec![Value::Array(vec![Value::Int(1), Value::Long(2)])]
        );
    }

    #[test]
    fn next_after_done_stays_false() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let plan = b.finish(src);
        let mut ctx = context(&plan);
        open(&plan.root, &mut ctx).unwrap();
        assert!(next(&plan.root, &mut ctx).unwrap());
        assert!(!next(&plan.root, &mut ctx).unwrap());
        assert!(!next(&plan.root, &mut ctx).unwrap());
        close(&plan.root, &mut ctx);
    }

    #[test]
    fn close_tolerates_a_never_opened_tree() {
        let mut b = PlanBuilder::new();
        let src = b.seq_const(vec![Value::Long(1)], LOC);
        let plan = b.finish(src);
        let mut ctx = context(&plan);
        close(&plan.root, &mut ctx);
    }
}
