//! Plan construction.
//!
//! `PlanBuilder` is the compiler's (and the test suite's) way to assemble a
//! node tree: it hands out dense register and state ids so the execution
//! context can be sized up front, and it rejects shapes the runtime cannot
//! execute (mismatched arithmetic arity, mixed operator families).

use quiver_core::error::{Error, Result};
use quiver_core::loc::Location;
use quiver_core::numeric::ArithOp;
use quiver_core::value::Value;
use quiver_core::{RegId, StateId};

use crate::aggr::AggrKind;
use crate::node::{AggrColumn, JoinPred, NodeMeta, PlanNode, SortSpec};

/// An immutable, executable plan plus the context dimensions it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub root: PlanNode,
    pub reg_count: usize,
    pub state_count: usize,
}

#[derive(Debug, Default)]
pub struct PlanBuilder {
    next_reg: u32,
    next_state: u32,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a standalone register not owned by any node (join
    /// variables, bind slots).
    pub fn reg(&mut self) -> RegId {
        let id = RegId::new(self.next_reg);
        self.next_reg += 1;
        id
    }

    fn meta(&mut self, loc: Location) -> NodeMeta {
        let state_id = StateId::new(self.next_state);
        self.next_state += 1;
        NodeMeta {
            result_reg: self.reg(),
            state_id,
            loc,
        }
    }

    pub fn constant(&mut self, value: impl Into<Value>, loc: Location) -> PlanNode {
        PlanNode::Const {
            meta: self.meta(loc),
            value: value.into(),
        }
    }

    pub fn seq_const(&mut self, items: Vec<Value>, loc: Location) -> PlanNode {
        PlanNode::SeqConst {
            meta: self.meta(loc),
            items,
        }
    }

    pub fn var_ref(&mut self, name: impl Into<String>, source: RegId, loc: Location) -> PlanNode {
        PlanNode::VarRef {
            meta: self.meta(loc),
            name: name.into(),
            source,
        }
    }

    pub fn field_step(
        &mut self,
        input: PlanNode,
        field: impl Into<String>,
        loc: Location,
    ) -> PlanNode {
        PlanNode::FieldStep {
            meta: self.meta(loc),
            input: Box::new(input),
            field: field.into(),
        }
    }

    /// `ops[i]` applies between the running result and `operands[i]`;
    /// `ops[0]` applies to the family identity. All operators must belong
    /// to one family.
    pub fn arith(
        &mut self,
        ops: Vec<ArithOp>,
        operands: Vec<PlanNode>,
        loc: Location,
    ) -> Result<PlanNode> {
        if ops.is_empty() || ops.len() != operands.len() {
            return Err(Error::invariant(format!(
                "arithmetic arity mismatch: {} operators, {} operands",
                ops.len(),
                operands.len()
            )));
        }
        let additive = matches!(ops[0], ArithOp::Add | ArithOp::Sub);
        for op in &ops {
            let this_additive = matches!(op, ArithOp::Add | ArithOp::Sub);
            if this_additive != additive {
                return Err(Error::invariant(
                    "arithmetic node mixes additive and multiplicative operators",
                ));
            }
        }
        Ok(PlanNode::Arith {
            meta: self.meta(loc),
            ops,
            operands,
        })
    }

    pub fn negate(&mut self, input: PlanNode, loc: Location) -> PlanNode {
        PlanNode::Negate {
            meta: self.meta(loc),
            input: Box::new(input),
        }
    }

    pub fn not(&mut self, input: PlanNode, loc: Location) -> PlanNode {
        PlanNode::Not {
            meta: self.meta(loc),
            input: Box::new(input),
        }
    }

    pub fn filter(&mut self, input: PlanNode, predicate: PlanNode, loc: Location) -> PlanNode {
        PlanNode::Filter {
            meta: self.meta(loc),
            input: Box::new(input),
            predicate: Box::new(predicate),
        }
    }

    pub fn offset_limit(
        &mut self,
        input: PlanNode,
        offset: Option<PlanNode>,
        limit: Option<PlanNode>,
        loc: Location,
    ) -> PlanNode {
        PlanNode::OffsetLimit {
            meta: self.meta(loc),
            input: Box::new(input),
            offset: offset.map(Box::new),
            limit: limit.map(Box::new),
        }
    }

    pub fn group(
        &mut self,
        input: PlanNode,
        grouping: Vec<(String, PlanNode)>,
        aggrs: Vec<AggrColumn>,
        loc: Location,
    ) -> PlanNode {
        PlanNode::Group {
            meta: self.meta(loc),
            input: Box::new(input),
            grouping,
            aggrs,
        }
    }

    pub fn aggr_column(
        &mut self,
        name: impl Into<String>,
        kind: AggrKind,
        input: PlanNode,
    ) -> AggrColumn {
        AggrColumn {
            name: name.into(),
            kind,
            input,
        }
    }

    pub fn seq_aggr(&mut self, input: PlanNode, kind: AggrKind, loc: Location) -> PlanNode {
        PlanNode::SeqAggr {
            meta: self.meta(loc),
            input: Box::new(input),
            kind,
        }
    }

    pub fn sort(&mut self, input: PlanNode, specs: Vec<SortSpec>, loc: Location) -> PlanNode {
        PlanNode::Sort {
            meta: self.meta(loc),
            input: Box::new(input),
            specs,
        }
    }

    /// `branch_scans[i]` names the resumable scan feeding branch i; pass the
    /// scan node's state id. Branches without a resumable source may pass
    /// their own state id (it will simply never match a resume entry).
    pub fn join(
        &mut self,
        branches: Vec<PlanNode>,
        preds: Vec<JoinPred>,
        branch_scans: Vec<StateId>,
        loc: Location,
    ) -> Result<PlanNode> {
        if branches.is_empty() {
            return Err(Error::invariant("join needs at least one branch"));
        }
        if branch_scans.len() != branches.len() {
            return Err(Error::invariant(format!(
                "join has {} branches but {} scan ids",
                branches.len(),
                branch_scans.len()
            )));
        }
        for pred in &preds {
            if pred.outer_branch >= branches.len() {
                return Err(Error::invariant(format!(
                    "join predicate references branch {} of {}",
                    pred.outer_branch,
                    branches.len()
                )));
            }
        }
        Ok(PlanNode::NestedLoopJoin {
            meta: self.meta(loc),
            branches,
            preds,
            branch_scans,
        })
    }

    pub fn in_list(
        &mut self,
        key: Vec<PlanNode>,
        candidates: Vec<Vec<PlanNode>>,
        loc: Location,
    ) -> Result<PlanNode> {
        if key.is_empty() {
            return Err(Error::invariant("membership key must have components"));
        }
        for row in &candidates {
            if row.len() != key.len() {
                return Err(Error::invariant(format!(
                    "membership candidate has {} components, key has {}",
                    row.len(),
                    key.len()
                )));
            }
        }
        Ok(PlanNode::In {
            meta: self.meta(loc),
            key,
            candidates,
        })
    }

    pub fn table_scan(&mut self, table: impl Into<String>, loc: Location) -> PlanNode {
        PlanNode::TableScan {
            meta: self.meta(loc),
            table: table.into(),
        }
    }

    pub fn delete(&mut self, table: impl Into<String>, input: PlanNode, loc: Location) -> PlanNode {
        PlanNode::Delete {
            meta: self.meta(loc),
            table: table.into(),
            input: Box::new(input),
        }
    }

    pub fn update(
        &mut self,
        table: impl Into<String>,
        field: impl Into<String>,
        value: PlanNode,
        input: PlanNode,
        loc: Location,
    ) -> PlanNode {
        PlanNode::Update {
            meta: self.meta(loc),
            table: table.into(),
            field: field.into(),
            value: Box::new(value),
            input: Box::new(input),
        }
    }

    pub fn index_size(
        &mut self,
        table: impl Into<String>,
        index: impl Into<String>,
        loc: Location,
    ) -> PlanNode {
        PlanNode::IndexSize {
            meta: self.meta(loc),
            table: table.into(),
            index: index.into(),
        }
    }

    pub fn finish(self, root: PlanNode) -> CompiledPlan {
        CompiledPlan {
            root,
            reg_count: self.next_reg as usize,
            state_count: self.next_state as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense() {
        let mut b = PlanBuilder::new();
        let loc = Location::new(1, 1);
        let c1 = b.constant(1i32, loc);
        let c2 = b.constant(2i32, loc);
        let sum = b
            .arith(vec![ArithOp::Add, ArithOp::Add], vec![c1, c2], loc)
            .unwrap();
        let plan = b.finish(sum);
        assert_eq!(plan.reg_count, 3);
        assert_eq!(plan.state_count, 3);
    }

    #[test]
    fn mixed_operator_families_are_rejected() {
        let mut b = PlanBuilder::new();
        let loc = Location::new(1, 1);
        let c1 = b.constant(1i32, loc);
        let c2 = b.constant(2i32, loc);
        let err = b
            .arith(vec![ArithOp::Add, ArithOp::Mul], vec![c1, c2], loc)
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}
