//! Per-execution operator state.
//!
//! One `OpState` slot exists per plan node, indexed by the node's `StateId`.
//! The plan tree itself never mutates; this table is the only place operator
//! progress lives, which is what makes mid-stream suspension a matter of
//! snapshotting the table.

use serde::{Deserialize, Serialize};

use quiver_core::value::Value;

use crate::aggr::AggrAcc;
use crate::external::WorkerIter;

/// Lifecycle of one operator within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Fresh,
    Running,
    Done,
}

/// What a buffering operator knows about its child when the child stops
/// producing. `Paused` means the child hit the batch quota and will produce
/// more after resumption; only `Exhausted` lets a sort commit to sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChildStatus {
    #[default]
    Unknown,
    Paused,
    Exhausted,
}

#[derive(Debug, Default)]
pub enum OpState {
    /// Slot not yet installed by `open`.
    #[default]
    Unset,
    /// Operators with no state beyond the lifecycle step.
    Simple(SimpleState),
    SeqConst(SeqConstState),
    OffsetLimit(OffsetLimitState),
    Sort(SortState),
    Group(GroupState),
    SeqAggr(SeqAggrState),
    Join(JoinState),
    External(ExternalState),
}

#[derive(Debug, Default)]
pub struct SimpleState {
    pub step: Step,
}

#[derive(Debug, Default)]
pub struct SeqConstState {
    pub step: Step,
    pub idx: usize,
}

#[derive(Debug, Default)]
pub struct OffsetLimitState {
    pub step: Step,
    /// Bounds are fixed on the first pull; `None` limit means unbounded.
    pub offset: u64,
    pub limit: Option<u64>,
    pub skipped: u64,
    pub emitted: u64,
}

#[derive(Debug, Default)]
pub struct SortState {
    pub step: Step,
    pub rows: Vec<Value>,
    /// False while still filling; the buffer may only be sorted once the
    /// input is known exhausted, never while paused.
    pub sorted: bool,
    pub next_idx: usize,
    pub input_status: ChildStatus,
}

#[derive(Debug, Default)]
pub struct GroupState {
    pub step: Step,
    /// Key of the group currently being accumulated; `None` before the
    /// first row and after the final group has been emitted.
    pub cur_key: Option<Vec<Value>>,
    pub accs: Vec<AggrAcc>,
}

#[derive(Debug, Default)]
pub struct SeqAggrState {
    pub step: Step,
    pub acc: Option<AggrAcc>,
}

#[derive(Debug, Default)]
pub struct JoinState {
    pub step: Step,
    /// Index of the branch currently being advanced.
    pub depth: usize,
    /// Branches whose first descent after a resumed open must not rewind,
    /// because the branch is already positioned at its resume point.
    pub keep_position: Vec<bool>,
}

/// State of a storage-delegating node; the worker itself is execution-scoped.
#[derive(Default)]
pub struct ExternalState {
    pub step: Step,
    pub worker: Option<Box<dyn WorkerIter>>,
}

impl std::fmt::Debug for ExternalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalState")
            .field("step", &self.step)
            .field("worker", &self.worker.as_ref().map(|w| w.kind_name()))
            .finish()
    }
}
