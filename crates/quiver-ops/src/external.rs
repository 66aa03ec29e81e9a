//! Storage worker seam.
//!
//! Scan, delete, update and index-size nodes do not touch storage
//! themselves; they delegate to a `WorkerIter` built by the execution's
//! `WorkerFactory`. Workers speak the same open/next/reset/close protocol as
//! plan nodes and move data exclusively through registers named in the
//! request, so the runtime stays storage-agnostic.

use quiver_core::error::Result;
use quiver_core::loc::Location;
use quiver_core::{RegId, StateId};

use crate::context::RuntimeContext;
use crate::resume::ResumeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    TableScan,
    Delete,
    Update,
    IndexSize,
}

/// Everything a factory needs to build one worker for one plan node.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub kind: WorkerKind,
    pub table: String,
    /// Index name, for index-size requests.
    pub index: Option<String>,
    /// Field being rewritten, for update requests.
    pub field: Option<String>,
    /// Where the worker publishes its output.
    pub result_reg: RegId,
    /// The delegating node's state slot; scan workers key their resume
    /// entries by it.
    pub state_id: StateId,
    /// Registers the worker reads: the input row for delete/update, plus
    /// the replacement value for update.
    pub arg_regs: Vec<RegId>,
    pub loc: Location,
}

/// Pull-based storage iterator.
///
/// `next` returning false means either exhaustion or a batch-quota pause;
/// workers that pause must set the context's reached-limit flag so buffering
/// ancestors do not mistake the pause for end-of-input.
pub trait WorkerIter: Send {
    fn kind_name(&self) -> &'static str;

    /// Prepare for iteration. Resumable workers consume their entry from
    /// the context's incoming resume snapshot here.
    fn open(&mut self, ctx: &mut RuntimeContext) -> Result<()>;

    fn next(&mut self, ctx: &mut RuntimeContext) -> Result<bool>;

    /// Rewind to the start. Clears any resume positioning applied at open.
    fn reset(&mut self, ctx: &mut RuntimeContext) -> Result<()>;

    fn close(&mut self, ctx: &mut RuntimeContext);

    /// Record the current position into an outgoing snapshot. Workers with
    /// no position (exhausted, or not positional at all) record nothing.
    fn suspend(&self, info: &mut ResumeInfo) -> Result<()>;
}

/// Built per execution by the engine; shared across all delegating nodes of
/// one plan.
pub trait WorkerFactory: Send + Sync {
    fn make(&self, req: &WorkerRequest) -> Result<Box<dyn WorkerIter>>;
}
