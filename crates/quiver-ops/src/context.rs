//! Per-execution runtime context.
//!
//! The context owns the register file, the operator state table, the memory
//! tracker and the incoming resume snapshot. It is the only mutable thing an
//! execution touches; the compiled plan stays shared and immutable.

use std::sync::Arc;

use quiver_core::config::{ExecConfig, ExecRole};
use quiver_core::error::{Error, Result};
use quiver_core::quota::MemoryQuota;
use quiver_core::value::Value;
use quiver_core::{RegId, StateId};
use quiver_mem::ConsumptionTracker;

use crate::external::{WorkerFactory, WorkerIter};
use crate::resume::{ResumeEntry, ResumeInfo};
use crate::state::{
    ExternalState, GroupState, JoinState, OffsetLimitState, OpState, SeqAggrState, SeqConstState,
    SimpleState, SortState,
};

pub struct RuntimeContext {
    regs: Vec<Value>,
    states: Vec<OpState>,
    tracker: ConsumptionTracker,
    role: ExecRole,
    batch_size: usize,
    trace_level: u8,
    /// Set by a storage worker that stopped at its batch quota rather than
    /// at end-of-input. Checked by buffering operators and by the driver.
    reached_limit: bool,
    /// Snapshot from the previous batch; operators consume their entries
    /// during `open`.
    resume: Option<ResumeInfo>,
    factory: Arc<dyn WorkerFactory>,
}

impl RuntimeContext {
    pub fn new(
        reg_count: usize,
        state_count: usize,
        cfg: &ExecConfig,
        role: ExecRole,
        factory: Arc<dyn WorkerFactory>,
        resume: Option<ResumeInfo>,
    ) -> Self {
        let mut states = Vec::with_capacity(state_count);
        states.resize_with(state_count, OpState::default);
        Self {
            regs: vec![Value::Empty; reg_count],
            states,
            tracker: ConsumptionTracker::new(cfg.mem_ceiling_bytes),
            role,
            batch_size: cfg.batch_size,
            trace_level: cfg.trace_level,
            reached_limit: false,
            resume,
            factory,
        }
    }

    // ---- registers ----

    pub fn reg(&self, id: RegId) -> &Value {
        &self.regs[id.index()]
    }

    pub fn set_reg(&mut self, id: RegId, v: Value) {
        self.regs[id.index()] = v;
    }

    // ---- configuration ----

    pub fn role(&self) -> ExecRole {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == ExecRole::Server
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn trace_level(&self) -> u8 {
        self.trace_level
    }

    // ---- memory ----

    pub fn tracker(&self) -> &ConsumptionTracker {
        &self.tracker
    }

    pub fn consume(&self, bytes: u64, tag: &'static str) -> Result<()> {
        self.tracker.consume(bytes, tag)
    }

    // ---- batch limit flag ----

    pub fn reached_limit(&self) -> bool {
        self.reached_limit
    }

    pub fn set_reached_limit(&mut self, hit: bool) {
        self.reached_limit = hit;
    }

    // ---- resume snapshot ----

    pub fn take_resume_entry(&mut self, id: StateId) -> Option<ResumeEntry> {
        self.resume.as_mut().and_then(|r| r.take(id))
    }

    pub fn has_resume_entry(&self, id: StateId) -> bool {
        self.resume.as_ref().is_some_and(|r| r.contains(id))
    }

    /// Flip the `on_current` flag of a pending scan entry. Joins call this
    /// during open, before the scan consumes its entry.
    pub fn mark_scan_on_current(&mut self, id: StateId, on: bool) {
        if let Some(ResumeEntry::Scan { on_current, .. }) =
            self.resume.as_mut().and_then(|r| r.get_mut(id))
        {
            *on_current = on;
        }
    }

    // ---- state table ----

    pub fn set_state(&mut self, id: StateId, state: OpState) {
        self.states[id.index()] = state;
    }

    pub fn clear_state(&mut self, id: StateId) {
        self.states[id.index()] = OpState::Unset;
    }

    pub fn state(&self, id: StateId) -> &OpState {
        &self.states[id.index()]
    }

    fn wrong_state(id: StateId, want: &str, got: &OpState) -> Error {
        Error::invariant(format!("state slot {id} holds {got:?}, expected {want}"))
    }

    pub fn simple_mut(&mut self, id: StateId) -> Result<&mut SimpleState> {
        match &mut self.states[id.index()] {
            OpState::Simple(s) => Ok(s),
            other => Err(Self::wrong_state(id, "simple", other)),
        }
    }

    pub fn seq_const_mut(&mut self, id: StateId) -> Result<&mut SeqConstState> {
        match &mut self.states[id.index()] {
            OpState::SeqConst(s) => Ok(s),
            other => Err(Self::wrong_state(id, "seq-const", other)),
        }
    }

    pub fn offset_limit_mut(&mut self, id: StateId) -> Result<&mut OffsetLimitState> {
        match &mut self.states[id.index()] {
            OpState::OffsetLimit(s) => Ok(s),
            other => Err(Self::wrong_state(id, "offset-limit", other)),
        }
    }

    pub fn sort_mut(&mut self, id: StateId) -> Result<&mut SortState> {
        match &mut self.states[id.index()] {
            OpState::Sort(s) => Ok(s),
            other => Err(Self::wrong_state(id, "sort", other)),
        }
    }

    pub fn group_mut(&mut self, id: StateId) -> Result<&mut GroupState> {
        match &mut self.states[id.index()] {
            OpState::Group(s) => Ok(s),
            other => Err(Self::wrong_state(id, "group", other)),
        }
    }

    pub fn seq_aggr_mut(&mut self, id: StateId) -> Result<&mut SeqAggrState> {
        match &mut self.states[id.index()] {
            OpState::SeqAggr(s) => Ok(s),
            other => Err(Self::wrong_state(id, "seq-aggr", other)),
        }
    }

    pub fn join_mut(&mut self, id: StateId) -> Result<&mut JoinState> {
        match &mut self.states[id.index()] {
            OpState::Join(s) => Ok(s),
            other => Err(Self::wrong_state(id, "join", other)),
        }
    }

    pub fn external_mut(&mut self, id: StateId) -> Result<&mut ExternalState> {
        match &mut self.states[id.index()] {
            OpState::External(s) => Ok(s),
            other => Err(Self::wrong_state(id, "external", other)),
        }
    }

    /// Temporarily move the worker out of its slot so it can be driven with
    /// the context borrowed mutably. Callers must put it back.
    pub fn take_worker(&mut self, id: StateId) -> Result<Box<dyn WorkerIter>> {
        self.external_mut(id)?
            .worker
            .take()
            .ok_or_else(|| Error::invariant(format!("no worker installed in state slot {id}")))
    }

    pub fn put_worker(&mut self, id: StateId, worker: Box<dyn WorkerIter>) -> Result<()> {
        self.external_mut(id)?.worker = Some(worker);
        Ok(())
    }

    pub fn factory(&self) -> Arc<dyn WorkerFactory> {
        Arc::clone(&self.factory)
    }

    // ---- tracing ----

    #[cfg(feature = "tracing")]
    pub fn trace(&self, op: &'static str, detail: &str) {
        if self.trace_level > 0 {
            tracing::trace!(op, detail, "exec step");
        }
    }

    #[cfg(not(feature = "tracing"))]
    pub fn trace(&self, _op: &'static str, _detail: &str) {}
}
