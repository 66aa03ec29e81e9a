//! Compiled plan-node tree.
//!
//! Plan nodes are immutable after compilation and carry no mutable execution
//! state: everything that changes while iterating lives in the context's
//! state table, keyed by each node's `StateId`. This keeps one compiled plan
//! shareable across any number of concurrent executions.
//!
//! Operators communicate through registers only. Every node owns exactly one
//! result register; a parent reads its child's output from the child's
//! register, never through return values.

use quiver_core::loc::Location;
use quiver_core::numeric::ArithOp;
use quiver_core::value::Value;
use quiver_core::{RegId, StateId};

use crate::aggr::AggrKind;

/// Fields common to every plan node: where its output goes, where its
/// execution state lives, and where it came from in the query text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMeta {
    pub result_reg: RegId,
    pub state_id: StateId,
    pub loc: Location,
}

/// One sort key: field name in the input record, direction, and where the
/// NULL-ish values (EMPTY, NULL, JSON null) go relative to everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
    pub nulls_first: bool,
}

/// Correlation edge of a nested-loop join: when the outer branch produces a
/// row, the named field of that row is published into `var_reg`, which the
/// inner branch's predicate reads through a `VarRef`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPred {
    pub outer_branch: usize,
    pub field: String,
    pub var_reg: RegId,
}

/// One output column of a grouping node.
#[derive(Debug, Clone, PartialEq)]
pub struct AggrColumn {
    pub name: String,
    pub kind: AggrKind,
    /// Server side: expression evaluated per input row (reads the input's
    /// register). Client side: unused; partials are read from the input
    /// record by `name`.
    pub input: PlanNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Single constant; produces exactly one item.
    Const { meta: NodeMeta, value: Value },

    /// Fixed sequence of constants produced in order.
    SeqConst { meta: NodeMeta, items: Vec<Value> },

    /// Reads a register owned by another node (join variable, bind slot)
    /// and republishes it. Produces nothing when the slot holds EMPTY.
    VarRef {
        meta: NodeMeta,
        name: String,
        source: RegId,
    },

    /// Steps into a record field. Non-record inputs and missing fields
    /// produce nothing rather than erroring.
    FieldStep {
        meta: NodeMeta,
        input: Box<PlanNode>,
        field: String,
    },

    /// N-ary arithmetic over one operator family. `ops` and `operands` have
    /// equal length; `ops[0]` applies to the family identity (0 or 1), so a
    /// leading `Sub` negates and a leading `Div` inverts.
    Arith {
        meta: NodeMeta,
        ops: Vec<ArithOp>,
        operands: Vec<PlanNode>,
    },

    /// Unary numeric negation at the operand's own kind.
    Negate { meta: NodeMeta, input: Box<PlanNode> },

    /// Three-valued boolean NOT. An input that produces nothing is TRUE.
    Not { meta: NodeMeta, input: Box<PlanNode> },

    /// Keeps input items whose predicate evaluates to TRUE.
    Filter {
        meta: NodeMeta,
        input: Box<PlanNode>,
        predicate: Box<PlanNode>,
    },

    /// Skips `offset` items then passes through at most `limit`. Bound
    /// expressions are evaluated once, on the first pull.
    OffsetLimit {
        meta: NodeMeta,
        input: Box<PlanNode>,
        offset: Option<Box<PlanNode>>,
        limit: Option<Box<PlanNode>>,
    },

    /// Streaming group-by over input already clustered by the grouping key.
    /// Server role aggregates raw rows; client role merges shard partials.
    Group {
        meta: NodeMeta,
        input: Box<PlanNode>,
        grouping: Vec<(String, PlanNode)>,
        aggrs: Vec<AggrColumn>,
    },

    /// Whole-sequence aggregate (no grouping key): one output item.
    SeqAggr {
        meta: NodeMeta,
        input: Box<PlanNode>,
        kind: AggrKind,
    },

    /// Full-buffer sort. Buffered items are charged to the memory ceiling.
    Sort {
        meta: NodeMeta,
        input: Box<PlanNode>,
        specs: Vec<SortSpec>,
    },

    /// N-branch nested-loop join; emits an array of the branch values.
    /// `branch_scans[i]` is the state id of the resumable scan feeding
    /// branch i, used to re-position branches when a suspended join resumes.
    NestedLoopJoin {
        meta: NodeMeta,
        branches: Vec<PlanNode>,
        preds: Vec<JoinPred>,
        branch_scans: Vec<StateId>,
    },

    /// Composite-key membership with three-valued semantics.
    In {
        meta: NodeMeta,
        key: Vec<PlanNode>,
        candidates: Vec<Vec<PlanNode>>,
    },

    /// Resumable storage scan over a named table; rows come from the
    /// execution's worker factory.
    TableScan { meta: NodeMeta, table: String },

    /// Deletes each input row from storage; emits TRUE per deleted row.
    Delete {
        meta: NodeMeta,
        table: String,
        input: Box<PlanNode>,
    },

    /// Rewrites one field of each input row in storage; emits the updated
    /// row.
    Update {
        meta: NodeMeta,
        table: String,
        field: String,
        value: Box<PlanNode>,
        input: Box<PlanNode>,
    },

    /// Emits the entry count of a named index as a single Long.
    IndexSize {
        meta: NodeMeta,
        table: String,
        index: String,
    },
}

impl PlanNode {
    pub fn meta(&self) -> &NodeMeta {
        match self {
            PlanNode::Const { meta, .. }
            | PlanNode::SeqConst { meta, .. }
            | PlanNode::VarRef { meta, .. }
            | PlanNode::FieldStep { meta, .. }
            | PlanNode::Arith { meta, .. }
            | PlanNode::Negate { meta, .. }
            | PlanNode::Not { meta, .. }
            | PlanNode::Filter { meta, .. }
            | PlanNode::OffsetLimit { meta, .. }
            | PlanNode::Group { meta, .. }
            | PlanNode::SeqAggr { meta, .. }
            | PlanNode::Sort { meta, .. }
            | PlanNode::NestedLoopJoin { meta, .. }
            | PlanNode::In { meta, .. }
            | PlanNode::TableScan { meta, .. }
            | PlanNode::Delete { meta, .. }
            | PlanNode::Update { meta, .. }
            | PlanNode::IndexSize { meta, .. } => meta,
        }
    }

    pub fn result_reg(&self) -> RegId {
        self.meta().result_reg
    }

    pub fn state_id(&self) -> StateId {
        self.meta().state_id
    }

    pub fn loc(&self) -> Location {
        self.meta().loc
    }

    /// Stable kind name for errors and traces.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanNode::Const { .. } => "const",
            PlanNode::SeqConst { .. } => "seq-const",
            PlanNode::VarRef { .. } => "var-ref",
            PlanNode::FieldStep { .. } => "field-step",
            PlanNode::Arith { .. } => "arith",
            PlanNode::Negate { .. } => "negate",
            PlanNode::Not { .. } => "not",
            PlanNode::Filter { .. } => "filter",
            PlanNode::OffsetLimit { .. } => "offset-limit",
            PlanNode::Group { .. } => "group",
            PlanNode::SeqAggr { .. } => "seq-aggr",
            PlanNode::Sort { .. } => "sort",
            PlanNode::NestedLoopJoin { .. } => "nested-loop-join",
            PlanNode::In { .. } => "in",
            PlanNode::TableScan { .. } => "table-scan",
            PlanNode::Delete { .. } => "delete",
            PlanNode::Update { .. } => "update",
            PlanNode::IndexSize { .. } => "index-size",
        }
    }

    /// All direct children, in evaluation order.
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Const { .. }
            | PlanNode::SeqConst { .. }
            | PlanNode::VarRef { .. }
            | PlanNode::TableScan { .. }
            | PlanNode::IndexSize { .. } => Vec::new(),
            PlanNode::FieldStep { input, .. }
            | PlanNode::Negate { input, .. }
            | PlanNode::Not { input, .. }
            | PlanNode::SeqAggr { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Delete { input, .. } => vec![input],
            PlanNode::Arith { operands, .. } => operands.iter().collect(),
            PlanNode::Filter {
                input, predicate, ..
            } => vec![input, predicate],
            PlanNode::OffsetLimit {
                input,
                offset,
                limit,
                ..
            } => {
                let mut out: Vec<&PlanNode> = vec![input];
                if let Some(o) = offset {
                    out.push(o);
                }
                if let Some(l) = limit {
                    out.push(l);
                }
                out
            }
            PlanNode::Group {
                input,
                grouping,
                aggrs,
                ..
            } => {
                let mut out: Vec<&PlanNode> = vec![input];
                out.extend(grouping.iter().map(|(_, e)| e));
                out.extend(aggrs.iter().map(|c| &c.input));
                out
            }
            PlanNode::NestedLoopJoin { branches, .. } => branches.iter().collect(),
            PlanNode::In {
                key, candidates, ..
            } => {
                let mut out: Vec<&PlanNode> = key.iter().collect();
                for row in candidates {
                    out.extend(row.iter());
                }
                out
            }
            PlanNode::Update { value, input, .. } => vec![value, input],
        }
    }
}
