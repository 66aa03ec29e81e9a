#![forbid(unsafe_code)]
//! quiver-ops: compiled plan nodes and their execution.
//!
//! A compiled plan is an immutable tree of [`node::PlanNode`]s. Executing it
//! needs a [`context::RuntimeContext`], which holds the register file (the
//! sole data channel between operators), the per-operator state table and
//! the memory tracker. The [`iter`] module implements the pull protocol
//! over that split, including mid-stream suspension into
//! [`resume::ResumeInfo`] snapshots and resumption out of them.

pub mod aggr;
pub mod build;
pub mod context;
pub mod external;
pub mod iter;
pub mod node;
pub mod resume;
pub mod state;

pub use aggr::{AggrAcc, AggrKind};
pub use build::{CompiledPlan, PlanBuilder};
pub use context::RuntimeContext;
pub use external::{WorkerFactory, WorkerIter, WorkerKind, WorkerRequest};
pub use node::{AggrColumn, JoinPred, NodeMeta, PlanNode, SortSpec};
pub use resume::{ResumeEntry, ResumeInfo};
pub use state::{ChildStatus, Step};
